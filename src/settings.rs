//! Import settings with TOML persistence
//!
//! A settings file holds an [`ImportConfig`]; command-line flags are layered
//! on top of it.

use std::fs;
use std::path::Path;

use anyhow::Context;
use rigport_core::UpAxis;
use rigport_import::ImportConfig;
use tracing::info;

/// Load import settings from `path`, or return defaults when no path is given.
pub fn load(path: Option<&Path>) -> anyhow::Result<ImportConfig> {
    let Some(path) = path else {
        info!("No settings file given, using defaults");
        return Ok(ImportConfig::default());
    };

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file {:?}", path))?;
    let config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse settings file {:?}", path))?;
    info!("Loaded settings from {:?}", path);
    Ok(config)
}

/// Save import settings to `path`.
pub fn save(config: &ImportConfig, path: &Path) -> anyhow::Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            fs::create_dir_all(dir)?;
        }
    }
    let content = toml::to_string_pretty(config)?;
    fs::write(path, content)?;
    info!("Saved settings to {:?}", path);
    Ok(())
}

/// Command-line overrides applied on top of file settings.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub up_axis: Option<UpAxis>,
    pub flip_faces: bool,
    pub no_meshes: bool,
    pub no_skeletons: bool,
}

impl Overrides {
    pub fn apply(&self, mut config: ImportConfig) -> ImportConfig {
        if self.up_axis.is_some() {
            config.up_axis = self.up_axis;
        }
        config.flip_faces |= self.flip_faces;
        if self.no_meshes {
            config.read_meshes = false;
        }
        if self.no_skeletons {
            config.read_skeletons = false;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_file() {
        assert_eq!(load(None).unwrap(), ImportConfig::default());
    }

    #[test]
    fn round_trips_through_file() {
        let dir = std::env::temp_dir().join(format!("rigport-settings-{}", std::process::id()));
        let path = dir.join("import.toml");
        let config = ImportConfig {
            up_axis: Some(UpAxis::ZUp),
            flip_faces: true,
            ..Default::default()
        };
        save(&config, &path).unwrap();
        assert_eq!(load(Some(&path)).unwrap(), config);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load(Some(Path::new("/nonexistent/import.toml"))).is_err());
    }

    #[test]
    fn overrides_win_over_file() {
        let file = ImportConfig {
            up_axis: Some(UpAxis::XUp),
            ..Default::default()
        };
        let overrides = Overrides {
            up_axis: Some(UpAxis::ZUp),
            no_skeletons: true,
            ..Default::default()
        };
        let config = overrides.apply(file);
        assert_eq!(config.up_axis, Some(UpAxis::ZUp));
        assert!(config.read_meshes);
        assert!(!config.read_skeletons);
        assert!(!config.flip_faces);
    }
}
