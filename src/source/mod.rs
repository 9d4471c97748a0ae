//! Release sources
//!
//! A release source is a remote catalog that can locate releases matching a
//! set of requirements and download them into the releases directory. Each
//! backend is a free-standing implementation; the Kilnfile selects which ones
//! are used and in what order.

mod bosh_io;
mod bucket;
mod factory;
mod http;
mod pivnet;
mod pool;

pub use bosh_io::BoshIoReleaseSource;
pub use bucket::BucketReleaseSource;
pub use factory::{release_sources, release_sources_with_token, ConfiguredSource};
pub use pivnet::PivnetReleaseSource;

use crate::error::{KilnError, KilnResult};
use crate::release::{LocalReleaseSet, ReleaseRequirementSet, RemoteRelease, Stemcell};
use async_trait::async_trait;
use std::path::Path;

/// Remote release catalog interface
///
/// Implemented by the bosh.io heuristic catalog, object storage buckets and
/// the release-notes product catalog.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// Locate releases that satisfy any of `requirements`.
    ///
    /// Requirements the catalog does not carry are left out of the result;
    /// only failures of the catalog itself are errors.
    async fn get_matched_releases(
        &self,
        requirements: &ReleaseRequirementSet,
        stemcell: &Stemcell,
    ) -> KilnResult<Vec<RemoteRelease>>;

    /// Download `matched` into `releases_dir` with at most `concurrency`
    /// transfers in flight, returning what was written.
    async fn download_releases(
        &self,
        releases_dir: &Path,
        matched: Vec<RemoteRelease>,
        concurrency: usize,
    ) -> KilnResult<LocalReleaseSet>;
}

/// Run a blocking catalog query on tokio's blocking pool
async fn blocking<T, F>(f: F) -> KilnResult<T>
where
    F: FnOnce() -> KilnResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| KilnError::Internal(format!("catalog task failed: {}", e)))?
}

/// Strip the trailing slash so paths can be appended with `format!`
fn endpoint_base(endpoint: &str) -> String {
    endpoint.trim_end_matches('/').to_string()
}
