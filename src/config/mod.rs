//! Kilnfile and releases directory management

pub mod schema;

pub use schema::{Kilnfile, ReleaseSourceConfig, SourceKind};

use crate::error::{KilnError, KilnResult};
use crate::lock::KilnfileLock;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Paths a command works with, all derived from the Kilnfile location
pub struct ConfigManager {
    kilnfile_path: PathBuf,
}

impl ConfigManager {
    pub fn new(kilnfile_path: PathBuf) -> Self {
        Self { kilnfile_path }
    }

    pub fn kilnfile_path(&self) -> &Path {
        &self.kilnfile_path
    }

    /// `<kilnfile>.lock`
    pub fn lock_path(&self) -> PathBuf {
        KilnfileLock::path_for(&self.kilnfile_path)
    }

    /// Read and parse the Kilnfile
    pub async fn load_kilnfile(&self) -> KilnResult<Kilnfile> {
        let path = &self.kilnfile_path;
        info!("Getting release sources from {}", path.display());

        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(KilnError::ConfigNotFound(path.clone()));
            }
            Err(e) => return Err(KilnError::io(format!("reading {}", path.display()), e)),
        };

        serde_yaml::from_str(&content).map_err(|e| {
            KilnError::config_file(format!("Kilnfile specification {}", path.display()), e)
        })
    }

    /// Read and parse the lock record next to the Kilnfile
    pub async fn load_lock(&self) -> KilnResult<KilnfileLock> {
        let path = self.lock_path();
        info!("Getting release information from {}", path.display());
        KilnfileLock::load(&path).await
    }

    /// Create the releases directory if it does not exist yet
    pub async fn ensure_releases_dir(dir: &Path) -> KilnResult<()> {
        match fs::metadata(dir).await {
            Ok(metadata) if metadata.is_dir() => Ok(()),
            Ok(_) => Err(KilnError::User(format!(
                "error with releases directory {}: not a directory",
                dir.display()
            ))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Creating releases directory {}", dir.display());
                fs::create_dir_all(dir).await.map_err(|e| {
                    KilnError::io(format!("creating releases directory {}", dir.display()), e)
                })
            }
            Err(e) => Err(KilnError::io(
                format!("error with releases directory {}", dir.display()),
                e,
            )),
        }
    }
}
