//! Directory scaffolding for the runtime's home directory.
//!
//! - [`XkitHome`]: global state at `~/.xkit/` (or `$XKIT_HOME`). Holds
//!   configuration, logs, and installed plugins.

use std::io;
use std::path::{Path, PathBuf};

/// Global xkit home directory (`~/.xkit/` or `$XKIT_HOME`).
#[derive(Debug, Clone)]
pub struct XkitHome {
    root: PathBuf,
}

impl XkitHome {
    /// Resolve the home directory.
    ///
    /// Checks `$XKIT_HOME` first, then falls back to `$HOME/.xkit/`.
    ///
    /// # Errors
    ///
    /// Returns an error if `$XKIT_HOME` is set but relative, or if neither
    /// `$XKIT_HOME` nor `$HOME` is set.
    pub fn resolve() -> io::Result<Self> {
        let root = if let Ok(custom) = std::env::var("XKIT_HOME") {
            let p = PathBuf::from(&custom);
            if !p.is_absolute() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "XKIT_HOME must be an absolute path",
                ));
            }
            p
        } else {
            let home = std::env::var("HOME").map_err(|_| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    "neither XKIT_HOME nor HOME environment variable is set",
                )
            })?;
            PathBuf::from(home).join(".xkit")
        };

        Ok(Self { root })
    }

    /// Create from an explicit path (useful for testing).
    #[must_use]
    pub fn from_path(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Ensure the directory structure exists.
    ///
    /// # Errors
    ///
    /// Returns an error if directory creation fails.
    pub fn ensure(&self) -> io::Result<()> {
        std::fs::create_dir_all(self.logs_dir())?;
        std::fs::create_dir_all(self.plugins_dir())?;
        Ok(())
    }

    /// Root directory path.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Logs directory (`~/.xkit/logs/`).
    #[must_use]
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Installed plugins directory (`~/.xkit/plugins/`).
    #[must_use]
    pub fn plugins_dir(&self) -> PathBuf {
        self.root.join("plugins")
    }

    /// Path to the runtime configuration file (`~/.xkit/xkit.toml`).
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.root.join("xkit.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_creates_expected_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let home = XkitHome::from_path(dir.path());
        home.ensure().unwrap();

        assert!(home.logs_dir().exists());
        assert!(home.plugins_dir().exists());
    }

    #[test]
    fn path_accessors() {
        let home = XkitHome::from_path("/tmp/test-xkit");
        assert_eq!(home.root(), Path::new("/tmp/test-xkit"));
        assert_eq!(home.logs_dir(), PathBuf::from("/tmp/test-xkit/logs"));
        assert_eq!(
            home.plugins_dir(),
            PathBuf::from("/tmp/test-xkit/plugins")
        );
        assert_eq!(
            home.config_path(),
            PathBuf::from("/tmp/test-xkit/xkit.toml")
        );
    }
}
