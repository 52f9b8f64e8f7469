use std::path::{Path, PathBuf};

/// Walk up the directory tree from `start`, checking for `filename` at each
/// level.
pub fn find_config(start: &Path, filename: &str) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        let candidate = current.join(filename);
        if candidate.is_file() {
            return Some(candidate);
        }
        if !current.pop() {
            return None;
        }
    }
}

/// Resolve the config file path. An explicitly given file must exist; with
/// no flag, search from the working directory upward for `skiff.toml`.
/// The config file is optional: `None` means run on flags alone.
pub fn resolve_config(cli_file: Option<&Path>) -> anyhow::Result<Option<PathBuf>> {
    if let Some(path) = cli_file {
        if path.is_file() {
            return Ok(Some(path.canonicalize()?));
        }
        anyhow::bail!("config file not found: {}", path.display());
    }
    let cwd = std::env::current_dir()?;
    Ok(find_config(&cwd, "skiff.toml"))
}
