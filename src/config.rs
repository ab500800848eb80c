use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub struct StoreConfig {
    pub database: Option<String>,
    pub graph: Option<String>,
    pub busy_timeout_ms: Option<u64>,
    pub max_reference_hops: Option<usize>,
    pub fetch_depth_limit: Option<u32>,
}

impl StoreConfig {
    pub fn database_path(&self) -> PathBuf {
        self.database.as_ref().map(PathBuf::from).unwrap_or_else(default_database_path)
    }

    pub fn busy_timeout(&self) -> Option<Duration> {
        self.busy_timeout_ms.map(Duration::from_millis)
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("cmstore.toml")
}

pub fn default_database_path() -> PathBuf {
    PathBuf::from(".cmstore").join("models.db")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<StoreConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: StoreConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &StoreConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}
