use std::path::{Path, PathBuf};

use crate::codec::{DEFAULT_BACKGROUND_QUALITY, DEFAULT_COMPOSITE_QUALITY};
use crate::compositor::CompositeOptions;
use crate::error::{Error, Result};

/// Engine settings, persisted as a plain `key=value` file.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineSettings {
    /// Root of the blob store (`instances/...` lives below it)
    pub data_root: PathBuf,
    /// Source image used when `create` is given none
    pub default_source: PathBuf,
    /// Default grid columns for new instances
    pub step_count_x: u32,
    /// Default grid rows for new instances
    pub step_count_y: u32,
    /// JPEG quality of the composite artifact (1-100)
    pub composite_quality: u8,
    /// JPEG quality of session backgrounds cropped from the source (1-100)
    pub background_quality: u8,
    /// Clip overrides to their cell instead of letting them spill over
    pub clip_overrides: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("data"),
            default_source: PathBuf::from("assets").join("paper4.jpg"),
            step_count_x: 6,
            step_count_y: 6,
            composite_quality: DEFAULT_COMPOSITE_QUALITY,
            background_quality: DEFAULT_BACKGROUND_QUALITY,
            clip_overrides: false,
        }
    }
}

impl EngineSettings {
    /// Default settings file location.
    /// On Linux:   ~/.config/tessera/tessera.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\Tessera\tessera.cfg
    /// On macOS:   ~/Library/Application Support/Tessera/tessera.cfg
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA").or_else(|_| std::env::var("USERPROFILE")).ok()?;
            return Some(PathBuf::from(appdata).join("Tessera").join("tessera.cfg"));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").ok()?;
            return Some(
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
                    .join("Tessera")
                    .join("tessera.cfg"),
            );
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .or_else(|_| std::env::var("HOME").map(|home| PathBuf::from(home).join(".config")))
                .ok()?;
            Some(config_dir.join("tessera").join("tessera.cfg"))
        }
    }

    /// Load from `path` (returns defaults if the file is missing).
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(_) => Self::default(),
        }
    }

    /// Load from the default location.
    pub fn load() -> Self {
        Self::settings_path()
            .map(|p| Self::load_from(&p))
            .unwrap_or_default()
    }

    /// Parse `key=value` lines. Unknown keys and unparsable values are ignored.
    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            let val = val.trim();
            match key.trim() {
                "data_root" => s.data_root = PathBuf::from(val),
                "default_source" => s.default_source = PathBuf::from(val),
                "step_count_x" => s.step_count_x = val.parse().unwrap_or(s.step_count_x),
                "step_count_y" => s.step_count_y = val.parse().unwrap_or(s.step_count_y),
                "composite_quality" => s.composite_quality = val.parse().unwrap_or(s.composite_quality),
                "background_quality" => s.background_quality = val.parse().unwrap_or(s.background_quality),
                "clip_overrides" => s.clip_overrides = val == "true",
                _ => {}
            }
        }
        s
    }

    pub fn to_config_string(&self) -> String {
        format!(
            "data_root={}\n\
             default_source={}\n\
             step_count_x={}\n\
             step_count_y={}\n\
             composite_quality={}\n\
             background_quality={}\n\
             clip_overrides={}\n",
            self.data_root.display(),
            self.default_source.display(),
            self.step_count_x,
            self.step_count_y,
            self.composite_quality,
            self.background_quality,
            self.clip_overrides,
        )
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_config_string())
    }

    pub fn validate(&self) -> Result<()> {
        if self.step_count_x == 0 || self.step_count_y == 0 {
            return Err(Error::InvalidConfiguration(format!(
                "step counts must be positive, got {}x{}",
                self.step_count_x, self.step_count_y
            )));
        }
        for (name, q) in [
            ("composite_quality", self.composite_quality),
            ("background_quality", self.background_quality),
        ] {
            if !(1..=100).contains(&q) {
                return Err(Error::InvalidConfiguration(format!("{} must be 1-100, got {}", name, q)));
            }
        }
        Ok(())
    }

    pub fn composite_options(&self) -> CompositeOptions {
        CompositeOptions {
            clip_overrides: self.clip_overrides,
        }
    }
}
