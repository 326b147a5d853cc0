//! CLI configuration, persisted as JSON.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use specfile::ParseOptions;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    /// Parser options used when no flag overrides them.
    #[serde(default)]
    pub parse: ParseOptions,
}

impl CliConfig {
    /// Platform config directory: `~/.config/specfile/`
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("specfile")
    }

    fn config_file() -> PathBuf {
        Self::config_dir().join("config.json")
    }

    /// Load from disk, or return defaults if the file doesn't exist.
    pub fn load_or_default() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_file())
    }

    fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&data)?)
        } else {
            Ok(Self::default())
        }
    }

    /// Persist to disk.
    pub fn save(&self) -> anyhow::Result<()> {
        let dir = Self::config_dir();
        std::fs::create_dir_all(&dir)?;
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(Self::config_file(), data)?;
        Ok(())
    }

    /// Update one `parse.*` key from its textual value.
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "mca_layout" => {
                self.parse.mca_layout = serde_json::from_value(value.into()).map_err(|_| {
                    anyhow::anyhow!("mca_layout must be 'single_line' or 'continuation'")
                })?
            }
            "strict_columns" => self.parse.strict_columns = value.parse()?,
            _ => anyhow::bail!("Unknown config key: {key}"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use specfile::McaLayout;

    #[test]
    fn missing_file_gives_defaults() {
        let cfg = CliConfig::load_from(Path::new("/nonexistent/specfile/config.json")).unwrap();
        assert_eq!(cfg, CliConfig::default());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: CliConfig = serde_json::from_str(r#"{"parse":{"strict_columns":true}}"#).unwrap();
        assert!(cfg.parse.strict_columns);
        assert_eq!(cfg.parse.mca_layout, McaLayout::Continuation);
    }

    #[test]
    fn set_known_keys() {
        let mut cfg = CliConfig::default();
        cfg.set("mca_layout", "single_line").unwrap();
        cfg.set("strict_columns", "true").unwrap();
        assert_eq!(cfg.parse.mca_layout, McaLayout::SingleLine);
        assert!(cfg.parse.strict_columns);

        assert!(cfg.set("mca_layout", "sideways").is_err());
        assert!(cfg.set("strict_columns", "maybe").is_err());
        assert!(cfg.set("port", "1").is_err());
    }
}
