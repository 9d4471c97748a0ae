//! Bulk release resolution
//!
//! Brings the releases directory in line with Kilnfile.lock: releases that
//! are already present and satisfy their pin are kept, unlisted releases are
//! removed, and everything still missing is requested from the configured
//! sources in priority order. The run ends by re-hashing every resolved
//! release against the lock.

use crate::error::{KilnError, KilnResult};
use crate::lock::KilnfileLock;
use crate::release::{LocalReleaseDirectory, LocalReleaseSet, ReleaseRequirementSet};
use crate::source::ConfiguredSource;
use crate::ui::{self, UiContext};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Settings for one fetch run
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub releases_dir: PathBuf,

    /// Concurrent downloads per source; 0 or 1 downloads sequentially
    pub download_threads: usize,

    /// Delete extra releases without asking
    pub no_confirm: bool,
}

/// Drives a full resolution against a set of sources
pub struct Fetcher {
    ui: UiContext,
    directory: LocalReleaseDirectory,
}

impl Fetcher {
    pub fn new(ui: UiContext) -> Self {
        Self {
            directory: LocalReleaseDirectory::new(ui.clone()),
            ui,
        }
    }

    /// Resolve every release pinned in `lock`.
    ///
    /// Returns the verified set of local releases. `lock` is only read.
    pub async fn fetch(
        &self,
        lock: &KilnfileLock,
        sources: &[ConfiguredSource],
        options: &FetchOptions,
    ) -> KilnResult<LocalReleaseSet> {
        let desired = ReleaseRequirementSet::from_lock(lock);
        let available = self.directory.get_local_releases(&options.releases_dir).await?;
        let (mut satisfied, mut missing, extra) = desired.partition(&available);

        info!(
            "{} required, {} present, {} missing, {} extra",
            desired.len(),
            satisfied.len(),
            missing.len(),
            extra.len()
        );

        if let Err(e) = self.directory.delete_extra_releases(&extra, options.no_confirm).await {
            warn!("Cleanup of extra releases failed: {}", e);
            ui::step_warn(&self.ui, &format!("Failed to delete extra releases: {}", e));
        }

        for configured in sources {
            if missing.is_empty() {
                break;
            }

            debug!("Querying {} for {} release(s)", configured.id, missing.len());
            let matched = configured
                .source
                .get_matched_releases(&missing, &lock.stemcell)
                .await?;
            if matched.is_empty() {
                debug!("{} has none of the missing releases", configured.id);
                continue;
            }

            ui::step_info(
                &self.ui,
                &format!("Found {} release(s) on {}", matched.len(), configured.id),
            );
            let downloaded = configured
                .source
                .download_releases(&options.releases_dir, matched, options.download_threads)
                .await?;

            satisfied = satisfied.with(&downloaded);
            missing = missing.without_releases(downloaded.release_ids());
        }

        if !missing.is_empty() {
            return Err(KilnError::MissingReleases(missing.ids().cloned().collect()));
        }

        self.directory.verify_checksums(&satisfied, lock).await?;
        ui::step_ok(
            &self.ui,
            &format!("{} release(s) verified in {}", satisfied.len(), options.releases_dir.display()),
        );

        Ok(satisfied)
    }
}
