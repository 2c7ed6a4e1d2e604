use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::info;
use lsb_core::ChartSink;

/// Writes charts back into a directory of extracted archive entries.
#[derive(Debug, Clone)]
pub struct DirSink {
    root: PathBuf,
    backup: bool,
}

impl DirSink {
    pub fn new(root: impl Into<PathBuf>, backup: bool) -> Self {
        Self {
            root: root.into(),
            backup,
        }
    }

    pub fn backup_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(".bak");
        PathBuf::from(name)
    }
}

impl ChartSink for DirSink {
    fn write_back(&mut self, entry_name: &str, bytes: &[u8]) -> io::Result<()> {
        let path = self.root.join(entry_name);
        if self.backup && path.exists() {
            let bak = Self::backup_path(&path);
            // Never overwrite the first backup: it holds the untouched original.
            if !bak.exists() {
                fs::copy(&path, &bak)?;
                info!("backed up {} to {}", path.display(), bak.display());
            }
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)
    }
}
