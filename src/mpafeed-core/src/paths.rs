use crate::config::CONFIG_FILE_NAME;
use crate::{APP_AUTHOR, APP_NAME, APP_QUALIFIER};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Where the binary keeps its config and logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppDirs {
    config: PathBuf,
    data: PathBuf,
}

impl AppDirs {
    /// Platform directories, e.g. `~/.config/mpafeed` on Linux.
    pub fn discover() -> Result<Self, DirsError> {
        ProjectDirs::from(APP_QUALIFIER, APP_AUTHOR, APP_NAME)
            .map(|dirs| Self {
                config: dirs.config_dir().to_path_buf(),
                data: dirs.data_dir().to_path_buf(),
            })
            .ok_or(DirsError::MissingProjectDirs)
    }

    /// Lays every directory out under `root` (portable installs, tests).
    pub fn under(root: &Path) -> Self {
        Self {
            config: root.join("config"),
            data: root.join("data"),
        }
    }

    pub fn ensure_exists(&self) -> Result<(), DirsError> {
        for dir in [self.config_dir(), self.data_dir(), self.log_dir().as_path()] {
            std::fs::create_dir_all(dir).map_err(|source| DirsError::CreateDirectory {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        Ok(())
    }

    pub fn config_dir(&self) -> &Path {
        &self.config
    }

    pub fn config_file(&self) -> PathBuf {
        self.config.join(CONFIG_FILE_NAME)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data.join("logs")
    }
}

#[derive(Debug, Error)]
pub enum DirsError {
    #[error("unable to determine a home directory for mpafeed")]
    MissingProjectDirs,
    #[error("failed to create directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },
}
