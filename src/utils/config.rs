use dotenv::dotenv;
use rustyline::EditMode;
use std::env;
use std::path::PathBuf;

pub struct Config {
    /// Binary name; also the log target filtered by the logger.
    pub name: String,
    pub theme: String,
    pub history_file: PathBuf,
    pub editor_mode: String,
    pub logger_level: String,
    pub logger_dir: PathBuf,
    pub logger_stderr: bool,
}

impl Config {
    fn get_config_dir(home: Option<String>) -> PathBuf {
        match home {
            Some(home) => PathBuf::from(home).join(".config/psh"),
            None => env::temp_dir().join("psh"),
        }
    }

    fn defaults(home: Option<String>) -> Self {
        let config_dir = Self::get_config_dir(home);
        Config {
            name: String::from("psh"),
            theme: String::from("default"),
            history_file: config_dir.join(".psh_history"),
            editor_mode: String::from("emacs"),
            logger_level: String::from("warn"),
            logger_dir: config_dir.join("logs"),
            logger_stderr: false,
        }
    }

    pub fn new() -> Self {
        if cfg!(debug_assertions) {
            dotenv::from_filename(".env.development").ok();
        } else {
            dotenv().ok();
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from `PSH_*` variables found through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::defaults(lookup("HOME"));

        if let Some(theme) = lookup("PSH_THEME") {
            config.theme = theme;
        }
        if let Some(editor) = lookup("PSH_EDITOR") {
            config.editor_mode = editor;
        }
        if let Some(history) = lookup("PSH_HISTORY") {
            config.history_file = PathBuf::from(history);
        }
        if let Some(level) = lookup("PSH_LOG_LEVEL") {
            config.logger_level = level;
        }
        if let Some(dir) = lookup("PSH_LOG_DIR") {
            config.logger_dir = PathBuf::from(dir);
        }
        if let Some(flag) = lookup("PSH_LOG_STDERR") {
            config.logger_stderr = matches!(flag.to_lowercase().as_str(), "1" | "true" | "yes");
        }

        config
    }

    pub fn get_edit_mode(&self) -> EditMode {
        match self.editor_mode.to_lowercase().as_str() {
            "vi" => EditMode::Vi,
            _ => EditMode::Emacs,
        }
    }
}
