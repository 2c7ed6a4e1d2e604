use std::path::Path;

use anyhow::{Context, Result};
use lsb_core::{CompileOptions, Decompiler};
use lsb_nls::Encoding;
use serde::{Deserialize, Serialize};

/// Settings read from `--config`. Every key is optional.
///
/// ```toml
/// encoding = "cp932"
/// backup = true
///
/// [decompiler]
/// text_only = false
///
/// [compile]
/// keep_comments = false
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub encoding: Encoding,
    /// Keep a `.bak` copy of every chart before it is overwritten.
    pub backup: bool,
    pub decompiler: Decompiler,
    pub compile: CompileOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            encoding: Encoding::Cp932,
            backup: true,
            decompiler: Decompiler::default(),
            compile: CompileOptions::default(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("failed to parse config {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let config: Config = toml::from_str("encoding = \"utf8\"\n[decompiler]\ntext_only = true\n").unwrap();
        assert_eq!(config.encoding, Encoding::Utf8);
        assert!(config.decompiler.text_only);
        assert!(config.backup);
        assert!(!config.compile.keep_comments);
    }

    #[test]
    fn load_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lmlsb.toml");
        std::fs::write(&path, "backup = \"maybe\"").unwrap();
        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("lmlsb.toml"));
    }
}
