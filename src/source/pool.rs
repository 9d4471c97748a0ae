//! Bounded-concurrency download batches
//!
//! A batch fans matched releases out over at most `concurrency` workers and
//! joins every worker before returning. The first failure aborts the work
//! that has not started yet and fails the whole batch; files that finished
//! before the failure stay on disk.

use super::http;
use crate::error::{KilnError, KilnResult};
use crate::release::{LocalReleaseSet, RemoteRelease};
use crate::ui::DownloadProgress;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};
use ureq::Agent;

/// Download every release in `matched` into `releases_dir`.
///
/// A `concurrency` of 0 or 1 downloads one release at a time.
pub(crate) async fn download_batch(
    agent: &Agent,
    releases_dir: &Path,
    matched: Vec<RemoteRelease>,
    concurrency: usize,
    auth: Option<String>,
    progress: DownloadProgress,
) -> KilnResult<LocalReleaseSet> {
    debug!(
        "Downloading {} release(s) with {} worker(s)",
        matched.len(),
        concurrency.max(1)
    );

    let downloaded = run_bounded(matched, concurrency, |release| {
        let agent = agent.clone();
        let releases_dir = releases_dir.to_path_buf();
        let auth = auth.clone();
        let progress = progress.clone();

        async move {
            progress.started(&release.id);
            let id = release.id.clone();
            let local = tokio::task::spawn_blocking(move || {
                http::download_release(&agent, &releases_dir, &release, auth.as_deref())
            })
            .await
            .map_err(|e| KilnError::Internal(format!("download task failed: {}", e)))?
            .map_err(|reason| KilnError::download(&id, reason))?;

            progress.finished(&local.id);
            Ok::<_, KilnError>(local)
        }
    })
    .await;

    progress.finish();
    Ok(downloaded?.into_iter().collect())
}

/// Run `job` over every item with at most `limit` jobs in flight.
///
/// The first failure aborts the remaining jobs and is returned once the set
/// has been torn down.
async fn run_bounded<T, R, F, Fut>(items: Vec<T>, limit: usize, job: F) -> KilnResult<Vec<R>>
where
    R: Send + 'static,
    F: Fn(T) -> Fut,
    Fut: Future<Output = KilnResult<R>> + Send + 'static,
{
    let permits = Arc::new(Semaphore::new(limit.max(1)));
    let mut tasks = JoinSet::new();

    for item in items {
        let permits = Arc::clone(&permits);
        let work = job(item);

        tasks.spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|e| KilnError::Internal(format!("download pool closed: {}", e)))?;
            work.await
        });
    }

    let mut done = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        let result = joined
            .map_err(|e| KilnError::Internal(format!("download task failed: {}", e)))
            .and_then(|r| r);

        match result {
            Ok(value) => done.push(value),
            Err(e) => {
                warn!("Aborting download batch: {}", e);
                tasks.abort_all();
                return Err(e);
            }
        }
    }
    Ok(done)
}
