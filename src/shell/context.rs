use std::collections::HashMap;
use std::env;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;

use crate::shell::error::ShellError;

const DEFAULT_PROMPT: &str = "$ ";

/// Session state every launched program inherits: the working directory and
/// the environment. `cd` changes it here; nothing touches the shell process.
#[derive(Debug, Clone)]
pub struct Context {
    cwd: PathBuf,
    vars: HashMap<String, String>,
}

impl Context {
    pub fn new(cwd: PathBuf, vars: HashMap<String, String>) -> Self {
        Self { cwd, vars }
    }

    pub fn from_process() -> io::Result<Self> {
        Ok(Self::new(env::current_dir()?, env::vars().collect()))
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn prompt(&self) -> String {
        self.get("PS1").unwrap_or(DEFAULT_PROMPT).to_string()
    }

    /// Resolves a user supplied path against the session working directory.
    pub fn resolve(&self, path: &str) -> PathBuf {
        self.cwd.join(path)
    }

    pub fn env_pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .vars
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        pairs.sort();
        pairs
    }

    pub fn change_dir(&mut self, target: &str) -> Result<(), ShellError> {
        let path = self.resolve(target);
        let metadata = path
            .metadata()
            .map_err(|e| ShellError::filesystem(&path, e))?;
        if !metadata.is_dir() {
            return Err(ShellError::filesystem(
                &path,
                io::Error::new(io::ErrorKind::Other, "Not a directory"),
            ));
        }
        let path = path
            .canonicalize()
            .map_err(|e| ShellError::filesystem(&path, e))?;
        debug!("working directory: {} -> {}", self.cwd.display(), path.display());
        self.vars
            .insert("PWD".to_string(), path.to_string_lossy().to_string());
        self.cwd = path;
        Ok(())
    }
}
