mod config_file;

use std::path::Path;

use config::Config;
use config::ConfigError as ExternalConfigError;
use config::File;
use config::FileFormat;
use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;

pub use crate::config_file::ConfigFileEntry;
pub use crate::config_file::ConfigFileMap;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration build/deserialize error")]
    Config(#[from] ExternalConfigError),
    #[error("Failed to deserialize client settings")]
    ClientSettings(#[from] serde_json::Error),
    #[error("Invalid `experimental.configFile` entry {key:?}: {reason}")]
    InvalidConfigFileMap { key: String, reason: String },
    #[error("Invalid `experimental.configFile` value: expected a string or an object, got {0}")]
    InvalidConfigFileType(&'static str),
}

/// Which watch backend to use when the client cannot push file events.
#[derive(Debug, Deserialize, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WatcherMode {
    /// Native OS events, falling back to polling if the native watcher fails
    #[default]
    Auto,
    Native,
    Polling,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct FilesSettings {
    pub exclude: Vec<String>,
}

impl Default for FilesSettings {
    fn default() -> Self {
        Self {
            exclude: vec![
                "**/.git/**".to_string(),
                "**/node_modules/**".to_string(),
                "**/.hg/**".to_string(),
                "**/.svn/**".to_string(),
            ],
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(default)]
pub struct ExperimentalSettings {
    /// Raw explicit config map, validated lazily by [`Settings::config_file_map`].
    #[serde(alias = "configFile")]
    pub config_file: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    debug: bool,
    files: FilesSettings,
    experimental: ExperimentalSettings,
    watcher: WatcherMode,
}

impl Settings {
    pub fn new(project_root: &Path) -> Result<Self, ConfigError> {
        let user_config_file = ProjectDirs::from("com.github", "tailwindlabs", "twls")
            .map(|proj_dirs| proj_dirs.config_dir().join("twls.toml"));

        Self::load_from_paths(project_root, user_config_file.as_deref())
    }

    fn load_from_paths(
        project_root: &Path,
        user_config_path: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = user_config_path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
        }

        builder = builder.add_source(
            File::from(project_root.join(".twls.toml"))
                .format(FileFormat::Toml)
                .required(false),
        );

        builder = builder.add_source(
            File::from(project_root.join("twls.toml"))
                .format(FileFormat::Toml)
                .required(false),
        );

        let config = builder.build()?;
        let settings = config.try_deserialize()?;
        Ok(settings)
    }

    /// Overlay the `tailwindCSS` section the client returned from
    /// `workspace/configuration`. Keys the client omits keep their file values.
    pub fn with_client_settings(mut self, value: &serde_json::Value) -> Result<Self, ConfigError> {
        if !value.is_object() {
            return Ok(self);
        }

        let client: ClientSettings = serde_json::from_value(value.clone())?;

        if let Some(files) = client.files {
            if let Some(exclude) = files.exclude {
                self.files.exclude = exclude;
            }
        }
        if let Some(experimental) = client.experimental {
            if let Some(config_file) = experimental.config_file {
                self.experimental.config_file = Some(config_file);
            }
        }
        if let Some(watcher) = client.watcher {
            self.watcher = watcher;
        }
        if let Some(debug) = client.debug {
            self.debug = debug;
        }

        Ok(self)
    }

    #[must_use]
    pub fn debug(&self) -> bool {
        self.debug
    }

    #[must_use]
    pub fn exclude(&self) -> &[String] {
        &self.files.exclude
    }

    #[must_use]
    pub fn watcher(&self) -> WatcherMode {
        self.watcher
    }

    /// The validated explicit config map, or `None` for automatic discovery.
    pub fn config_file_map(&self) -> Result<Option<ConfigFileMap>, ConfigError> {
        match &self.experimental.config_file {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(value) => ConfigFileMap::parse(value).map(Some),
        }
    }

    /// Whether moving from `self` to `next` invalidates the project topology.
    #[must_use]
    pub fn requires_restart(&self, next: &Settings) -> bool {
        self.files.exclude != next.files.exclude
            || self.experimental.config_file != next.experimental.config_file
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ClientSettings {
    files: Option<ClientFiles>,
    experimental: Option<ClientExperimental>,
    watcher: Option<WatcherMode>,
    debug: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct ClientFiles {
    exclude: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ClientExperimental {
    config_file: Option<serde_json::Value>,
}
