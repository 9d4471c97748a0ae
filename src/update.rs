//! Single release pin updates
//!
//! Finds one `{name, version}` on the configured sources, downloads it and
//! rewrites its Kilnfile.lock entry with the new version and the sha1 of
//! the downloaded file. Every other entry and the stemcell criteria keep
//! their bytes.

use crate::error::{KilnError, KilnResult};
use crate::lock::KilnfileLock;
use crate::release::{LocalRelease, ReleaseId, ReleaseRequirement, ReleaseRequirementSet, Satisfies};
use crate::source::ConfiguredSource;
use crate::ui::{self, UiContext};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// What to update and where to put the artifact
#[derive(Debug, Clone)]
pub struct UpdateRequest {
    pub name: String,
    pub version: String,
    pub releases_dir: PathBuf,
    pub download_threads: usize,
}

pub struct ReleaseUpdater {
    ui: UiContext,
}

impl ReleaseUpdater {
    pub fn new(ui: UiContext) -> Self {
        Self { ui }
    }

    /// Update the pin for `request.name` in the lock at `lock_path`.
    ///
    /// Only existing pins can be updated. The lock is replaced atomically
    /// and only after the new artifact has been downloaded and hashed.
    pub async fn update(
        &self,
        lock_path: &Path,
        sources: &[ConfiguredSource],
        request: &UpdateRequest,
    ) -> KilnResult<LocalRelease> {
        let lock = KilnfileLock::load(lock_path).await?;
        let Some(current) = lock.release(&request.name) else {
            return Err(KilnError::ReleaseNotInLock {
                name: request.name.clone(),
                lock: lock_path.to_path_buf(),
            });
        };
        info!(
            "Updating {} from {} to {}",
            request.name, current.version, request.version
        );

        let requirement = ReleaseRequirement::new(&request.name, &request.version, &lock.stemcell);
        let local = self.download(&requirement, &lock, sources, request).await?;

        let to_hash = local.clone();
        let sha1 = tokio::task::spawn_blocking(move || to_hash.sha1())
            .await
            .map_err(|e| KilnError::Internal(format!("checksum task failed: {}", e)))??;
        debug!("{} has sha1 {}", local.id, sha1);

        KilnfileLock::update_pin(lock_path, &request.name, &request.version, &sha1).await?;

        ui::outro_success(
            &self.ui,
            &format!("Updated {} to {}", request.name, request.version),
        );
        Ok(local)
    }

    /// Ask each source in turn until one delivers the release
    async fn download(
        &self,
        requirement: &ReleaseRequirement,
        lock: &KilnfileLock,
        sources: &[ConfiguredSource],
        request: &UpdateRequest,
    ) -> KilnResult<LocalRelease> {
        let id: ReleaseId = requirement.id();
        let wanted: ReleaseRequirementSet = std::iter::once(requirement.clone()).collect();

        for configured in sources {
            let matched: Vec<_> = configured
                .source
                .get_matched_releases(&wanted, &lock.stemcell)
                .await?
                .into_iter()
                .filter(|release| release.satisfies(requirement))
                .collect();
            if matched.is_empty() {
                debug!("{} does not have {}", configured.id, id);
                continue;
            }

            ui::step_info(&self.ui, &format!("Found {} on {}", id, configured.id));
            let downloaded = configured
                .source
                .download_releases(&request.releases_dir, matched, request.download_threads)
                .await?;
            if let Some(local) = downloaded.get(&id) {
                return Ok(local.clone());
            }
        }

        Err(KilnError::MissingReleases(vec![id]))
    }
}
