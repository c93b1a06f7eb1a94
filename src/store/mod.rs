pub mod target;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::forwarding::content::StagedMessage;

pub use target::Target;

/// Whether admin messages go out immediately or wait for confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Auto,
    Manual,
}

impl Mode {
    pub fn toggled(self) -> Self {
        match self {
            Mode::Auto => Mode::Manual,
            Mode::Manual => Mode::Auto,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Auto => write!(f, "auto"),
            Mode::Manual => write!(f, "manual"),
        }
    }
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Mode::Auto),
            "manual" => Ok(Mode::Manual),
            other => anyhow::bail!("unknown mode '{}', expected auto or manual", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    AlreadyPresent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    NotFound,
}

/// Everything the bot persists, rewritten as a whole on each mutation.
#[derive(Debug, Clone, PartialEq, Serialize)]
struct StateDocument {
    mode: Mode,
    targets: Vec<Target>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pending_message: Option<StagedMessage>,
}

impl StateDocument {
    fn empty(mode: Mode) -> Self {
        Self {
            mode,
            targets: Vec::new(),
            pending_message: None,
        }
    }
}

/// Accepted file layouts. Older deployments kept a bare JSON array of
/// target ids; it is migrated on load.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredState {
    Legacy(Vec<Target>),
    Current {
        #[serde(default)]
        mode: Option<Mode>,
        #[serde(default)]
        targets: Vec<Target>,
        #[serde(default)]
        pending_message: Option<StagedMessage>,
    },
}

/// JSON-backed target list, mode flag and pending-message slot.
///
/// All reads and writes go through one mutex, so concurrent handlers never
/// interleave a load-mutate-save cycle.
pub struct StateStore {
    path: PathBuf,
    doc: Mutex<StateDocument>,
}

impl StateStore {
    /// Open the store at `path`. A missing or unreadable file is replaced by
    /// an empty document in `default_mode`, which is written back right away.
    pub async fn open(path: impl Into<PathBuf>, default_mode: Mode) -> Self {
        let path = path.into();

        let (doc, needs_write) = match load_document(&path, default_mode).await {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!(
                    "State file {} is unusable ({:#}); resetting to an empty store",
                    path.display(),
                    e
                );
                (StateDocument::empty(default_mode), true)
            }
        };

        if needs_write {
            if let Err(e) = write_document(&path, &doc).await {
                warn!("Failed to write state file {}: {:#}", path.display(), e);
            }
        }

        info!(
            "State loaded from {}: mode={}, {} target(s), pending={}",
            path.display(),
            doc.mode,
            doc.targets.len(),
            doc.pending_message.is_some()
        );

        Self {
            path,
            doc: Mutex::new(doc),
        }
    }

    /// Add a target, persisting before it becomes visible.
    pub async fn add_target(&self, target: Target) -> Result<AddOutcome> {
        let mut doc = self.doc.lock().await;
        if doc.targets.contains(&target) {
            return Ok(AddOutcome::AlreadyPresent);
        }
        let mut next = doc.clone();
        next.targets.push(target.clone());
        self.commit(&mut doc, next).await?;
        info!("Target added: {}", target);
        Ok(AddOutcome::Added)
    }

    /// Remove a target
    pub async fn remove_target(&self, target: &Target) -> Result<RemoveOutcome> {
        let mut doc = self.doc.lock().await;
        if !doc.targets.contains(target) {
            return Ok(RemoveOutcome::NotFound);
        }
        let mut next = doc.clone();
        next.targets.retain(|t| t != target);
        self.commit(&mut doc, next).await?;
        info!("Target removed: {}", target);
        Ok(RemoveOutcome::Removed)
    }

    /// Current targets in insertion order.
    pub async fn targets(&self) -> Vec<Target> {
        self.doc.lock().await.targets.clone()
    }

    pub async fn contains(&self, target: &Target) -> bool {
        self.doc.lock().await.targets.contains(target)
    }

    /// Current sending mode
    pub async fn mode(&self) -> Mode {
        self.doc.lock().await.mode
    }

    /// Set the mode. Setting the current mode again writes nothing.
    pub async fn set_mode(&self, mode: Mode) -> Result<Mode> {
        let mut doc = self.doc.lock().await;
        if doc.mode != mode {
            let mut next = doc.clone();
            next.mode = mode;
            self.commit(&mut doc, next).await?;
            info!("Mode set to {}", mode);
        }
        Ok(mode)
    }

    /// Flip auto/manual and return the new mode
    pub async fn toggle_mode(&self) -> Result<Mode> {
        let mut doc = self.doc.lock().await;
        let mut next = doc.clone();
        next.mode = doc.mode.toggled();
        let mode = next.mode;
        self.commit(&mut doc, next).await?;
        info!("Mode toggled to {}", mode);
        Ok(mode)
    }

    /// Stage `message`, returning true if it replaced an unconfirmed one.
    pub async fn set_pending(&self, message: StagedMessage) -> Result<bool> {
        let mut doc = self.doc.lock().await;
        let replaced = doc.pending_message.is_some();
        let mut next = doc.clone();
        next.pending_message = Some(message);
        self.commit(&mut doc, next).await?;
        Ok(replaced)
    }

    /// Remove and return the pending message. Once taken it is gone from
    /// memory even if the file could not be rewritten.
    ///
    /// On a failed write the file still holds the message until the next
    /// successful mutation rewrites the whole document.
    pub async fn take_pending(&self) -> Option<StagedMessage> {
        let mut doc = self.doc.lock().await;
        let taken = doc.pending_message.take()?;
        if let Err(e) = write_document(&self.path, &doc).await {
            error!(
                "Pending message cleared in memory but still on disk at {}; \
                 it will reappear after a restart unless another change is saved first: {:#}",
                self.path.display(),
                e
            );
        }
        Some(taken)
    }

    /// Peek at the pending message without consuming it
    pub async fn pending(&self) -> Option<StagedMessage> {
        self.doc.lock().await.pending_message.clone()
    }

    async fn commit(&self, doc: &mut StateDocument, next: StateDocument) -> Result<()> {
        write_document(&self.path, &next).await?;
        *doc = next;
        Ok(())
    }
}

/// Returns the document plus whether it should be rewritten (new file,
/// legacy layout, or duplicates collapsed).
async fn load_document(path: &Path, default_mode: Mode) -> Result<(StateDocument, bool)> {
    if !path.exists() {
        info!("No state file at {}, creating one", path.display());
        return Ok((StateDocument::empty(default_mode), true));
    }

    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read state file: {}", path.display()))?;
    let stored: StoredState =
        serde_json::from_str(&content).context("Failed to parse state file")?;

    let (doc, migrated) = match stored {
        StoredState::Legacy(targets) => {
            info!("Migrating legacy target list in {}", path.display());
            (
                StateDocument {
                    mode: default_mode,
                    targets,
                    pending_message: None,
                },
                true,
            )
        }
        StoredState::Current {
            mode,
            targets,
            pending_message,
        } => (
            StateDocument {
                mode: mode.unwrap_or(default_mode),
                targets,
                pending_message,
            },
            mode.is_none(),
        ),
    };

    let (targets, had_duplicates) = dedup(doc.targets);
    if had_duplicates {
        debug!("Collapsed duplicate targets in {}", path.display());
    }

    Ok((
        StateDocument { targets, ..doc },
        migrated || had_duplicates,
    ))
}

fn dedup(targets: Vec<Target>) -> (Vec<Target>, bool) {
    let before = targets.len();
    let mut unique: Vec<Target> = Vec::with_capacity(before);
    for target in targets {
        if !unique.contains(&target) {
            unique.push(target);
        }
    }
    let changed = unique.len() != before;
    (unique, changed)
}

async fn write_document(path: &Path, doc: &StateDocument) -> Result<()> {
    let json = serde_json::to_vec_pretty(doc).context("Failed to serialize state")?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, &json)
        .await
        .with_context(|| format!("Failed to write state file: {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to replace state file: {}", path.display()))?;
    Ok(())
}
