//! Release source construction from the Kilnfile

use super::{BoshIoReleaseSource, BucketReleaseSource, PivnetReleaseSource, ReleaseSource};
use crate::config::{Kilnfile, SourceKind};
use crate::error::{KilnError, KilnResult};
use crate::ui::UiContext;
use tracing::debug;

/// Environment variable consulted when a pivnet source has no `token`
pub const PIVNET_TOKEN_ENV: &str = "PIVNET_TOKEN";

/// A release source together with the Kilnfile settings that named it
pub struct ConfiguredSource {
    pub id: String,
    pub publishable: bool,
    pub source: Box<dyn ReleaseSource>,
}

/// Build the release sources named in `kilnfile`, in priority order.
///
/// With `allow_only_publishable` set, sources not marked `publishable` are
/// left out.
pub fn release_sources(
    kilnfile: &Kilnfile,
    allow_only_publishable: bool,
    ui: &UiContext,
) -> KilnResult<Vec<ConfiguredSource>> {
    let env_token = std::env::var(PIVNET_TOKEN_ENV).ok();
    release_sources_with_token(kilnfile, allow_only_publishable, ui, env_token)
}

/// As [`release_sources`], with the pivnet token fallback passed explicitly
pub fn release_sources_with_token(
    kilnfile: &Kilnfile,
    allow_only_publishable: bool,
    ui: &UiContext,
    fallback_token: Option<String>,
) -> KilnResult<Vec<ConfiguredSource>> {
    let mut sources = Vec::new();

    for config in &kilnfile.release_sources {
        let id = config.id();
        if allow_only_publishable && !config.publishable {
            debug!("Skipping unpublishable release source {}", id);
            continue;
        }

        let source: Box<dyn ReleaseSource> = match config.kind {
            SourceKind::BoshIo(ref bosh_io) => {
                Box::new(BoshIoReleaseSource::new(&bosh_io.endpoint, ui.clone()))
            }
            SourceKind::Bucket(ref bucket) => {
                if bucket.bucket.is_empty() {
                    return Err(KilnError::SourceConfig {
                        id,
                        reason: "bucket is required".to_string(),
                    });
                }
                Box::new(BucketReleaseSource::new(id.clone(), bucket, ui.clone())?)
            }
            SourceKind::Pivnet(ref pivnet) => {
                let token = pivnet
                    .token
                    .clone()
                    .filter(|t| !t.is_empty())
                    .or_else(|| fallback_token.clone().filter(|t| !t.is_empty()))
                    .ok_or_else(|| KilnError::SourceConfig {
                        id: id.clone(),
                        reason: format!("no token configured and {} is not set", PIVNET_TOKEN_ENV),
                    })?;
                Box::new(PivnetReleaseSource::new(id.clone(), pivnet, token, ui.clone()))
            }
        };

        debug!("Using release source {}", id);
        sources.push(ConfiguredSource {
            id,
            publishable: config.publishable,
            source,
        });
    }

    Ok(sources)
}
