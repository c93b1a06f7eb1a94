use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A destination chat: a numeric chat/group/channel id, or a channel handle.
///
/// Parsing normalizes, so `"123"` and `123` are the same target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawTarget", into = "RawTarget")]
pub enum Target {
    Chat(i64),
    Channel(String),
}

/// On-disk shape: JSON number for ids, JSON string for handles.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawTarget {
    Id(i64),
    Name(String),
}

impl Target {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            anyhow::bail!("target is empty");
        }
        if let Ok(id) = raw.parse::<i64>() {
            return Ok(Target::Chat(id));
        }
        if raw.chars().any(char::is_whitespace) {
            anyhow::bail!("target '{}' must not contain whitespace", raw);
        }
        Ok(Target::Channel(raw.to_string()))
    }
}

impl FromStr for Target {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Target::parse(s)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Chat(id) => write!(f, "{}", id),
            Target::Channel(name) => write!(f, "{}", name),
        }
    }
}

impl TryFrom<RawTarget> for Target {
    type Error = anyhow::Error;

    fn try_from(raw: RawTarget) -> Result<Self> {
        match raw {
            RawTarget::Id(id) => Ok(Target::Chat(id)),
            RawTarget::Name(name) => Target::parse(&name),
        }
    }
}

impl From<Target> for RawTarget {
    fn from(target: Target) -> Self {
        match target {
            Target::Chat(id) => RawTarget::Id(id),
            Target::Channel(name) => RawTarget::Name(name),
        }
    }
}
