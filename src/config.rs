use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Optional configuration file, looked up in the invocation directory.
pub const CONFIG_FILE: &str = "geopipe.toml";

/// Directory layout for a pipeline run. Directory names are configuration,
/// not hard-coded paths: any field can be overridden from [`CONFIG_FILE`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Layout {
    /// Root data directory; the downloaded archive lands directly in it.
    pub data_dir: PathBuf,
    /// Subdirectory of `data_dir` holding the unpacked tar container.
    pub container_dir: String,
    /// Subdirectory of `data_dir` holding one directory per decompressed
    /// member.
    pub members_dir: String,
}

impl Default for Layout {
    fn default() -> Self {
        Layout {
            data_dir: PathBuf::from("data"),
            container_dir: "unpacked".to_string(),
            members_dir: "members".to_string(),
        }
    }
}

impl Layout {
    /// Load the layout from [`CONFIG_FILE`] if present, defaults otherwise.
    pub fn load() -> Result<Self> {
        if !Path::new(CONFIG_FILE).exists() {
            return Ok(Layout::default());
        }
        let raw =
            fs::read_to_string(CONFIG_FILE).with_context(|| format!("reading {CONFIG_FILE}"))?;
        toml::from_str(&raw).with_context(|| format!("parsing {CONFIG_FILE}"))
    }

    pub fn archive_path(&self, archive_name: &str) -> PathBuf {
        self.data_dir.join(archive_name)
    }

    pub fn container_path(&self) -> PathBuf {
        self.data_dir.join(&self.container_dir)
    }

    pub fn members_path(&self) -> PathBuf {
        self.data_dir.join(&self.members_dir)
    }
}
