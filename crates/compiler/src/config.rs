use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub options: BuildOptions,
    #[serde(default)]
    pub maps: Vec<MapEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildOptions {
    pub minimize: bool,
    pub force: bool,
    pub parallel_dedup: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            minimize: true,
            force: false,
            parallel_dedup: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MapEntry {
    pub name: String,
    /// Map export (JSON) relative to the project file.
    pub export: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("build/tilemaps")
}

impl ProjectConfig {
    pub fn parse(text: &str) -> Result<Self> {
        let config: ProjectConfig = toml::from_str(text).context("parse project toml")?;
        for (index, map) in config.maps.iter().enumerate() {
            if map.name.is_empty() {
                return Err(anyhow::anyhow!("map entry {index} has an empty name"));
            }
            if config.maps[..index].iter().any(|other| other.name == map.name) {
                return Err(anyhow::anyhow!("map {} is listed twice", map.name));
            }
        }
        Ok(config)
    }

    /// Reads `path` and resolves every relative path against the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("read project file {}", path.display()))?;
        let mut config =
            Self::parse(&text).with_context(|| format!("load project {}", path.display()))?;
        let base = path.parent().unwrap_or(Path::new("."));
        config.output_dir = base.join(&config.output_dir);
        for map in &mut config.maps {
            map.export = base.join(&map.export);
        }
        Ok(config)
    }
}
