use std::error::Error;
use std::fmt;
use std::io;
use std::path::PathBuf;

#[derive(Debug)]
pub enum ShellError {
    /// Malformed command line, reported before anything runs.
    Syntax(String),
    /// A builtin was called with the wrong arguments.
    Usage(String),
    /// A redirect target or `cd` directory could not be used.
    Filesystem { path: PathBuf, source: io::Error },
    /// pipe/fork/wait failed in the shell itself.
    Os(nix::Error),
    Io(io::Error),
}

impl fmt::Display for ShellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShellError::Syntax(msg) => write!(f, "{}", msg),
            ShellError::Usage(msg) => write!(f, "usage: {}", msg),
            ShellError::Filesystem { path, source } => {
                write!(f, "{}: {}", path.display(), source)
            }
            ShellError::Os(err) => write!(f, "system error: {}", err),
            ShellError::Io(err) => write!(f, "{}", err),
        }
    }
}

impl Error for ShellError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ShellError::Filesystem { source, .. } => Some(source),
            ShellError::Os(err) => Some(err),
            ShellError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<nix::Error> for ShellError {
    fn from(err: nix::Error) -> Self {
        ShellError::Os(err)
    }
}

impl From<io::Error> for ShellError {
    fn from(err: io::Error) -> Self {
        ShellError::Io(err)
    }
}

impl ShellError {
    pub fn filesystem(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ShellError::Filesystem {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = ShellError::Usage("cd <dir>".to_string());
        assert_eq!(err.to_string(), "usage: cd <dir>");

        let err = ShellError::filesystem(
            "/nope",
            io::Error::new(io::ErrorKind::NotFound, "No such file or directory"),
        );
        assert_eq!(err.to_string(), "/nope: No such file or directory");
        assert!(err.source().is_some());
    }
}
