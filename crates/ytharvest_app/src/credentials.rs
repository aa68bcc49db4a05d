use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};

/// Read the developer key: the first whitespace-separated token of the file.
pub fn read_api_key(path: &Path) -> Result<String> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading API key file {}", path.display()))?;
    match text.split_whitespace().next() {
        Some(key) => Ok(key.to_string()),
        None => bail!("API key file {} is empty", path.display()),
    }
}
