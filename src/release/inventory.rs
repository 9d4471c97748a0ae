//! Local releases directory
//!
//! Identifies cached artifacts by the `release.MF` inside each tarball,
//! removes artifacts nothing requires, and checks what remains against the
//! checksums pinned in Kilnfile.lock.

use super::model::{Artifact, LocalRelease, ReleaseId, Stemcell};
use super::sets::LocalReleaseSet;
use crate::error::{KilnError, KilnResult};
use crate::lock::KilnfileLock;
use crate::ui::{self, UiContext};
use flate2::read::GzDecoder;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use std::fs::{self, File};
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

const MANIFEST_NAME: &str = "release.MF";

/// The parts of a release manifest that identify the artifact
#[derive(Debug, Deserialize)]
struct ReleaseManifest {
    name: String,

    #[serde(deserialize_with = "scalar_string")]
    version: String,

    #[serde(default)]
    compiled_packages: Vec<CompiledPackage>,
}

#[derive(Debug, Deserialize)]
struct CompiledPackage {
    stemcell: String,
}

/// Accept `version: 42` as well as `version: "42"`
fn scalar_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match serde_yaml::Value::deserialize(deserializer)? {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!(
            "expected a version string, found {:?}",
            other
        ))),
    }
}

/// Read one release tarball into a `LocalRelease`
pub fn read_local_release(path: &Path) -> KilnResult<LocalRelease> {
    let manifest = read_manifest(path)?;

    let artifact = match manifest.compiled_packages.first() {
        None => Artifact::Built,
        Some(package) => {
            let stemcell = Stemcell::parse_slashed(&package.stemcell).ok_or_else(|| {
                KilnError::ReleaseManifest {
                    path: path.to_path_buf(),
                    reason: format!("invalid compiled package stemcell '{}'", package.stemcell),
                }
            })?;
            Artifact::Compiled(stemcell)
        }
    };

    Ok(LocalRelease::new(
        ReleaseId::new(manifest.name, manifest.version),
        artifact,
        path.to_path_buf(),
    ))
}

fn read_manifest(path: &Path) -> KilnResult<ReleaseManifest> {
    let manifest_error = |reason: String| KilnError::ReleaseManifest {
        path: path.to_path_buf(),
        reason,
    };

    let file = File::open(path).map_err(|e| KilnError::io(format!("opening {}", path.display()), e))?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    let entries = archive.entries().map_err(|e| manifest_error(e.to_string()))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| manifest_error(e.to_string()))?;
        let entry_path = entry.path().map_err(|e| manifest_error(e.to_string()))?;
        if !is_top_level_manifest(&entry_path) {
            continue;
        }

        let mut content = String::new();
        entry
            .read_to_string(&mut content)
            .map_err(|e| manifest_error(e.to_string()))?;
        return serde_yaml::from_str(&content).map_err(|e| manifest_error(e.to_string()));
    }

    Err(manifest_error(format!("no {} in archive", MANIFEST_NAME)))
}

fn is_top_level_manifest(path: &Path) -> bool {
    let mut normal = path.components().filter(|c| matches!(c, Component::Normal(_)));
    matches!(
        (normal.next(), normal.next()),
        (Some(Component::Normal(name)), None) if name == MANIFEST_NAME
    )
}

/// Scan `dir` for release tarballs.
///
/// A missing directory is an empty inventory. Archives without a readable
/// manifest are skipped; a re-download overwrites them.
pub fn scan(dir: &Path) -> KilnResult<LocalReleaseSet> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("Releases directory {} does not exist", dir.display());
            return Ok(LocalReleaseSet::default());
        }
        Err(e) => return Err(KilnError::io(format!("reading {}", dir.display()), e)),
    };

    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| KilnError::io(format!("reading {}", dir.display()), e))?;
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "tgz") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut releases = Vec::with_capacity(paths.len());
    for path in paths {
        match read_local_release(&path) {
            Ok(release) => {
                debug!("Found {} at {}", release.id, path.display());
                releases.push(release);
            }
            Err(e) => warn!("Skipping {}: {}", path.display(), e),
        }
    }

    Ok(releases.into_iter().collect())
}

/// The local releases directory as seen by one run
pub struct LocalReleaseDirectory {
    ui: UiContext,
}

impl LocalReleaseDirectory {
    pub fn new(ui: UiContext) -> Self {
        Self { ui }
    }

    /// Inventory of release tarballs in `releases_dir`
    pub async fn get_local_releases(&self, releases_dir: &Path) -> KilnResult<LocalReleaseSet> {
        let dir = releases_dir.to_path_buf();
        tokio::task::spawn_blocking(move || scan(&dir))
            .await
            .map_err(|e| KilnError::Internal(format!("release scan task failed: {}", e)))?
    }

    /// Delete `extra` from disk after confirmation.
    ///
    /// Declining the prompt is not an error. Individual delete failures are
    /// collected into one error after every file has been attempted.
    pub async fn delete_extra_releases(
        &self,
        extra: &LocalReleaseSet,
        no_confirm: bool,
    ) -> KilnResult<()> {
        if extra.is_empty() {
            return Ok(());
        }

        ui::section(&self.ui, "Releases not listed in Kilnfile.lock");
        for release in extra.releases() {
            ui::step_info(&self.ui, &format!("{} at {}", release.id, release.path.display()));
        }

        let ctx = self.ui.clone().with_auto_yes(no_confirm);
        if !ui::confirm(&ctx, "Delete these releases?", false).await? {
            ui::remark(&self.ui, "Keeping extra releases");
            return Ok(());
        }

        let mut failures = Vec::new();
        for release in extra.releases() {
            match tokio::fs::remove_file(&release.path).await {
                Ok(()) => {
                    info!("Deleted {}", release.path.display());
                    ui::step_ok(&self.ui, &format!("Deleted {}", release.id));
                }
                Err(e) => failures.push(format!("{}: {}", release.path.display(), e)),
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(KilnError::User(format!(
                "could not delete {}",
                failures.join(", ")
            )))
        }
    }

    /// Compare each release's content against the lock's pinned sha1
    pub async fn verify_checksums(
        &self,
        releases: &LocalReleaseSet,
        lock: &KilnfileLock,
    ) -> KilnResult<()> {
        for release in releases.releases() {
            let expected = match lock.release(&release.id.name) {
                Some(locked) if !locked.sha1.is_empty() => locked.sha1.clone(),
                _ => {
                    debug!("No pinned sha1 for {}, skipping verification", release.id);
                    continue;
                }
            };

            let to_hash = release.clone();
            let actual = tokio::task::spawn_blocking(move || to_hash.sha1())
                .await
                .map_err(|e| KilnError::Internal(format!("checksum task failed: {}", e)))??;

            if !actual.eq_ignore_ascii_case(&expected) {
                ui::step_error(&self.ui, &format!("{} does not match Kilnfile.lock", release.id));
                return Err(KilnError::ChecksumMismatch {
                    release: release.id.clone(),
                    expected,
                    actual,
                });
            }
            debug!("Verified {} ({})", release.id, actual);
        }

        Ok(())
    }
}
