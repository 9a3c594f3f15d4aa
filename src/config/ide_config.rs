use std::{
    borrow::Cow,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};

use compio::fs;
use hashlink::LinkedHashMap;
use saphyr::{LoadableYamlNode, Scalar, Yaml};
use snafu::prelude::*;
use tracing::debug;

use crate::project::{EditorSettings, Language, Theme};
use crate::sandbox::ExecutionLimits;

pub const CONFIG_FILE_NAME: &str = "scratchpad.yaml";

pub fn get_config_file_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE_NAME)
}

/// Settings read from `scratchpad.yaml`:
///
/// ```yaml
/// execution:
///   max_steps: 1000000
///   timeout_ms: 2000
///   max_call_depth: 200
/// editor:
///   language: javascript
///   theme: vs-dark
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdeConfig {
    pub limits: ExecutionLimits,
    pub editor: EditorSettings,
}

impl IdeConfig {
    /// Reads the config file in `root`. A missing file yields the defaults.
    pub async fn read(root: &Path) -> Result<Self, ConfigError> {
        match Self::from_path(get_config_file_path(root)).await {
            Err(ConfigError::ReadError { source, .. }) if source.kind() == ErrorKind::NotFound => {
                debug!("No {} in {}, using defaults", CONFIG_FILE_NAME, root.display());
                Ok(Self::default())
            }
            other => other,
        }
    }

    pub async fn from_path(path: PathBuf) -> Result<Self, ConfigError> {
        debug!("Reading config file: {}", path.display());
        let bytes = fs::read(&path).await.context(ReadSnafu {
            file_path: path.display().to_string(),
        })?;
        debug!("Successfully read config file: {} bytes", bytes.len());
        let contents = String::from_utf8(bytes).context(EncodingSnafu {
            file_path: path.display().to_string(),
        })?;
        contents.as_str().try_into()
    }

    fn parse_execution(section: &LinkedHashMap<Yaml, Yaml>) -> Result<ExecutionLimits, ConfigError> {
        let mut limits = ExecutionLimits::default();
        for (key, value) in string_keyed(section, "execution") {
            match key {
                "max_steps" => limits.max_steps = positive_integer("execution", key, value)?,
                "timeout_ms" => {
                    limits.timeout =
                        Duration::from_millis(positive_integer("execution", key, value)?)
                }
                "max_call_depth" => {
                    limits.max_call_depth = positive_integer("execution", key, value)? as usize
                }
                _ => debug!("Ignoring unknown key 'execution.{}'", key),
            }
        }
        Ok(limits)
    }

    fn parse_editor(section: &LinkedHashMap<Yaml, Yaml>) -> Result<EditorSettings, ConfigError> {
        let mut editor = EditorSettings::default();
        for (key, value) in string_keyed(section, "editor") {
            match key {
                "language" => {
                    editor.language = value
                        .as_str()
                        .and_then(Language::from_name)
                        .context(InvalidValueSnafu {
                            section: "editor",
                            key,
                            expected: "one of javascript, typescript, python, html, css, json",
                        })?
                }
                "theme" => {
                    editor.theme = value
                        .as_str()
                        .and_then(Theme::from_name)
                        .context(InvalidValueSnafu {
                            section: "editor",
                            key,
                            expected: "one of vs-dark, light, hc-black",
                        })?
                }
                _ => debug!("Ignoring unknown key 'editor.{}'", key),
            }
        }
        Ok(editor)
    }
}

fn section<'a, 'input>(
    top_level: &'a LinkedHashMap<Yaml<'input>, Yaml<'input>>,
    name: &'static str,
) -> Result<Option<&'a LinkedHashMap<Yaml<'input>, Yaml<'input>>>, ConfigError> {
    match top_level.get(&Yaml::Value(Scalar::String(Cow::Borrowed(name)))) {
        None | Some(Yaml::Value(Scalar::Null)) => Ok(None),
        Some(value) => value
            .as_mapping()
            .map(Some)
            .context(SectionNotMapSnafu { section: name }),
    }
}

fn string_keyed<'a, 'input>(
    section: &'a LinkedHashMap<Yaml<'input>, Yaml<'input>>,
    name: &'static str,
) -> impl Iterator<Item = (&'a str, &'a Yaml<'input>)> {
    section.iter().filter_map(move |(key, value)| {
        if let Yaml::Value(Scalar::String(key)) = key {
            return Some((key.as_ref(), value));
        }
        debug!("Skipping non-string key in '{}': {:?}", name, key);
        None
    })
}

fn positive_integer(section: &'static str, key: &str, value: &Yaml) -> Result<u64, ConfigError> {
    match value {
        Yaml::Value(Scalar::Integer(n)) if *n > 0 => Ok(*n as u64),
        _ => InvalidValueSnafu {
            section,
            key,
            expected: "a positive integer",
        }
        .fail(),
    }
}

impl TryFrom<&str> for IdeConfig {
    type Error = ConfigError;

    fn try_from(contents: &str) -> Result<Self, Self::Error> {
        let contents_vec = Yaml::load_from_str(contents).context(ParseSnafu)?;
        let contents = contents_vec.first().context(MalformedConfigSnafu)?;
        let top_level = contents.as_mapping().context(TopLevelNotMapSnafu)?;

        for (key, _) in top_level.iter() {
            match key {
                Yaml::Value(Scalar::String(name)) if name == "execution" || name == "editor" => {}
                _ => debug!("Ignoring unknown config section: {:?}", key),
            }
        }

        let limits = match section(top_level, "execution")? {
            Some(execution) => Self::parse_execution(execution)?,
            None => ExecutionLimits::default(),
        };
        let editor = match section(top_level, "editor")? {
            Some(editor) => Self::parse_editor(editor)?,
            None => EditorSettings::default(),
        };
        Ok(IdeConfig { limits, editor })
    }
}

#[derive(Debug, Snafu)]
pub enum ConfigError {
    #[snafu(display("Failed to read the config file: {}", file_path))]
    ReadError {
        file_path: String,
        source: std::io::Error,
    },
    #[snafu(display("Config file is not valid UTF-8: {}", file_path))]
    EncodingError {
        file_path: String,
        source: std::string::FromUtf8Error,
    },
    #[snafu(display("Failed to parse the config file"))]
    ParseError { source: saphyr::ScanError },
    #[snafu(display("Improperly formatted config file"))]
    MalformedConfig,
    #[snafu(display("Top level of config should be a map"))]
    TopLevelNotMap,
    #[snafu(display("Section '{}' should be a map", section))]
    SectionNotMap { section: &'static str },
    #[snafu(display("'{}.{}' should be {}", section, key, expected))]
    InvalidValue {
        section: &'static str,
        key: String,
        expected: &'static str,
    },
}
