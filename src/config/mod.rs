mod ide_config;

pub use ide_config::{CONFIG_FILE_NAME, ConfigError, IdeConfig, get_config_file_path};
