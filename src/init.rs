use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::config::config_home;

/// Default config.toml content
const DEFAULT_CONFIG: &str = r#"# System-wide SSH settings for gerrit-dispatch.

[ssh]
# Gerrit's sshd usually listens on 29418.
port = 22

# Default credential, used when no per-user preferences resolve.
# private_key = "/etc/gerrit-dispatch/id_ed25519"
# username = "review-bot"

# Passed to ssh as -o StrictHostKeyChecking=<value>
strict_host_key_checking = "accept-new"

# connect_timeout_secs = 10
"#;

/// Default preferences.toml content
const DEFAULT_PREFERENCES: &str = r#"# Per-user credential. Overrides [ssh] in config.toml
# when both values are set and the key file is readable.

[gerrit]
# private_key = "/home/me/.ssh/id_ed25519"
# username = "me"
"#;

/// Run the init command
pub fn run_init(force: bool) -> Result<()> {
    let dir = config_home().context("Failed to get config directory")?;
    init_dir(&dir, force)?;

    println!();
    println!("Initialization complete!");
    println!("Edit {} to set the default credential.", dir.join("config.toml").display());
    Ok(())
}

fn init_dir(dir: &Path, force: bool) -> Result<()> {
    if !dir.exists() {
        println!("Creating configuration directory: {}", dir.display());
        fs::create_dir_all(dir).context("Failed to create config directory")?;
    }

    write_file_if_needed(&dir.join("config.toml"), DEFAULT_CONFIG, force, "config.toml")?;
    write_file_if_needed(
        &dir.join("preferences.toml"),
        DEFAULT_PREFERENCES,
        force,
        "preferences.toml",
    )?;
    Ok(())
}

/// Write a file if it doesn't exist or force is true
fn write_file_if_needed(path: &Path, content: &str, force: bool, name: &str) -> Result<()> {
    if path.exists() && !force {
        println!(
            "Skipping {} (already exists, use --force to overwrite)",
            name
        );
        return Ok(());
    }

    println!("Writing {}...", name);
    fs::write(path, content).with_context(|| format!("Failed to write {}", name))?;
    Ok(())
}
