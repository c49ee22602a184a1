use anyhow::{anyhow, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub fn ensure_session_dir() -> Result<PathBuf> {
    let home_dir = dirs::home_dir().ok_or_else(|| anyhow!("Could not determine home directory"))?;
    let session_dir = home_dir.join(".config").join("sqlmate").join("sessions");

    if !session_dir.exists() {
        fs::create_dir_all(&session_dir)?;
    }

    Ok(session_dir)
}

/// Session names default to the start time, e.g. `20241017-142501`
pub fn default_session_name() -> String {
    chrono::Local::now().format("%Y%m%d-%H%M%S").to_string()
}

pub fn session_path(dir: &Path, name: &str) -> Result<PathBuf> {
    let name = name.trim();
    if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
        return Err(anyhow!("Invalid session name: {:?}", name));
    }
    Ok(dir.join(format!("{}.jsonl", name)))
}
