//! relaybot setup: asks a few questions on the terminal and writes a
//! `config.toml` the bot can start from.
//!
//! The target path is the first argument (default `config.toml`). An
//! existing file is only replaced when `--force` is given.

use anyhow::{Context, Result};
use std::io::{self, Write};
use std::path::PathBuf;

struct ConfigParams<'a> {
    bot_token: &'a str,
    admin_id: u64,
    state_path: &'a str,
    default_mode: &'a str,
    port: u16,
}

/// Quote `value` as a TOML string, escaping backslashes and quotes.
fn toml_string(value: &str) -> String {
    toml::Value::String(value.to_owned()).to_string()
}

/// Produces a valid config.toml string. Extracted so it can be unit-tested.
fn format_config(p: &ConfigParams<'_>) -> String {
    let bot_token = toml_string(p.bot_token);
    let admin_id = p.admin_id;
    let state_path = toml_string(p.state_path);
    let default_mode = toml_string(p.default_mode);
    let port = p.port;

    format!(
        r#"[telegram]
bot_token = {bot_token}
admin_id = {admin_id}

[forwarding]
state_path = {state_path}
default_mode = {default_mode}
per_target_buttons = true
forwarded_only = false
send_timeout_secs = 30

[keep_alive]
enabled = true
host = "0.0.0.0"
port = {port}
heartbeat_cron = "0 0 * * * *"

[polling]
conflict_backoff_initial_secs = 5
conflict_backoff_max_secs = 120
"#
    )
}

fn normalize_mode(input: &str) -> Result<&'static str> {
    match input.trim().to_ascii_lowercase().as_str() {
        "" | "auto" | "a" => Ok("auto"),
        "manual" | "m" => Ok("manual"),
        other => anyhow::bail!("unknown mode '{}', expected auto or manual", other),
    }
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let force = args.iter().any(|a| a == "--force");
    let config_path = args
        .iter()
        .find(|a| !a.starts_with("--"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists; pass --force to overwrite it",
            config_path.display()
        );
    }

    println!("=== relaybot setup ===\n");

    let read_line = |prompt: &str| -> Result<String> {
        print!("{prompt}");
        io::stdout().flush()?;
        let mut buf = String::new();
        io::stdin().read_line(&mut buf)?;
        Ok(buf.trim().to_owned())
    };

    let or_default = |s: String, default: &str| {
        if s.is_empty() {
            default.to_owned()
        } else {
            s
        }
    };

    let bot_token = read_line("Bot token (from @BotFather): ")?;
    if bot_token.is_empty() {
        anyhow::bail!("a bot token is required");
    }
    let admin_id: u64 = read_line("Your Telegram user id: ")?
        .parse()
        .context("the admin id must be a number")?;
    let state_path = or_default(
        read_line("State file [forwarder_state.json]: ")?,
        "forwarder_state.json",
    );
    let default_mode = normalize_mode(&read_line("Default mode, auto or manual [auto]: ")?)?;
    let port: u16 = or_default(read_line("Keep-alive port [8080]: ")?, "8080")
        .parse()
        .context("the port must be a number between 0 and 65535")?;

    let config = format_config(&ConfigParams {
        bot_token: &bot_token,
        admin_id,
        state_path: &state_path,
        default_mode,
        port,
    });

    std::fs::write(&config_path, &config)
        .with_context(|| format!("Could not write {}", config_path.display()))?;

    println!("\n✓  config saved to {}", config_path.display());
    println!("   Run the bot with:  cargo run --bin relaybot");
    Ok(())
}
