use serde_json::Value;

use crate::ConfigError;

/// Pattern used when the user names a single config file with no selectors.
const APPLY_EVERYWHERE: &str = "**";

/// One user-declared project: a config path and the document patterns it owns.
///
/// Both are relative to the workspace root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFileEntry {
    pub config: String,
    pub selectors: Vec<String>,
}

/// Validated `experimental.configFile` setting.
///
/// Accepts either a bare path (one project owning every document) or an
/// object mapping config paths to a pattern or list of patterns. Any other
/// shape is rejected as a whole; no partial map is ever produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFileMap {
    entries: Vec<ConfigFileEntry>,
}

impl ConfigFileMap {
    pub fn parse(value: &Value) -> Result<Self, ConfigError> {
        match value {
            Value::String(config) => Ok(Self {
                entries: vec![ConfigFileEntry {
                    config: config.clone(),
                    selectors: vec![APPLY_EVERYWHERE.to_string()],
                }],
            }),
            Value::Object(map) => {
                let entries = map
                    .iter()
                    .map(|(key, value)| {
                        Ok(ConfigFileEntry {
                            config: key.clone(),
                            selectors: parse_selectors(key, value)?,
                        })
                    })
                    .collect::<Result<Vec<_>, ConfigError>>()?;
                Ok(Self { entries })
            }
            other => Err(ConfigError::InvalidConfigFileType(type_name(other))),
        }
    }

    #[must_use]
    pub fn entries(&self) -> &[ConfigFileEntry] {
        &self.entries
    }
}

fn parse_selectors(key: &str, value: &Value) -> Result<Vec<String>, ConfigError> {
    match value {
        Value::String(pattern) => Ok(vec![pattern.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(pattern) => Ok(pattern.clone()),
                other => Err(ConfigError::InvalidConfigFileMap {
                    key: key.to_string(),
                    reason: format!("array items must be strings, got {}", type_name(other)),
                }),
            })
            .collect(),
        other => Err(ConfigError::InvalidConfigFileMap {
            key: key.to_string(),
            reason: format!(
                "expected a string or an array of strings, got {}",
                type_name(other)
            ),
        }),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
