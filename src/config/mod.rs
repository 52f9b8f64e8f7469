pub mod model;
pub mod resolve;
pub mod validate;

use std::path::Path;

use model::SkiffConfig;

/// Load and parse a skiff config file.
pub fn load_config(path: &Path) -> anyhow::Result<SkiffConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let config: SkiffConfig = toml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("failed to parse config file {}: {}", path.display(), e))?;
    Ok(config)
}
