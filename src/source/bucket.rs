//! Object storage bucket release source
//!
//! The bucket is listed through the JSON object listing API and every key is
//! matched against the configured path template. Keys that capture stemcell
//! groups are compiled releases; the rest are built releases.

use super::{blocking, endpoint_base, http, pool, ReleaseSource};
use crate::config::schema::BucketConfig;
use crate::error::{KilnError, KilnResult};
use crate::release::{
    Artifact, LocalReleaseSet, ReleaseId, ReleaseRequirementSet, RemoteRelease, Satisfies, Stemcell,
};
use crate::ui::{DownloadProgress, UiContext};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};
use ureq::Agent;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectListing {
    #[serde(default)]
    items: Vec<ObjectEntry>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectEntry {
    name: String,
}

/// Release source backed by an object storage bucket
#[derive(Clone)]
pub struct BucketReleaseSource {
    id: String,
    endpoint: String,
    bucket: String,
    prefix: Option<String>,
    path_template: Regex,
    agent: Agent,
    ui: UiContext,
}

impl BucketReleaseSource {
    /// Fails when `path_template` is not a valid regex or lacks the
    /// `release_name` and `release_version` groups.
    pub fn new(id: String, config: &BucketConfig, ui: UiContext) -> KilnResult<Self> {
        let path_template = Regex::new(&config.path_template).map_err(|e| KilnError::SourceConfig {
            id: id.clone(),
            reason: format!("invalid path_template: {}", e),
        })?;

        let groups: Vec<&str> = path_template.capture_names().flatten().collect();
        for required in ["release_name", "release_version"] {
            if !groups.contains(&required) {
                return Err(KilnError::SourceConfig {
                    id,
                    reason: format!("path_template is missing the {} group", required),
                });
            }
        }

        Ok(Self {
            id,
            endpoint: endpoint_base(&config.endpoint),
            bucket: config.bucket.clone(),
            prefix: config.prefix.clone(),
            path_template,
            agent: Agent::new_with_defaults(),
            ui,
        })
    }

    /// Every object key in the bucket, following page tokens
    fn list_keys(&self) -> KilnResult<Vec<String>> {
        let url = format!("{}/storage/v1/b/{}/o", self.endpoint, self.bucket);
        let mut keys = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query: Vec<(&str, &str)> = Vec::new();
            if let Some(ref prefix) = self.prefix {
                query.push(("prefix", prefix.as_str()));
            }
            if let Some(ref token) = page_token {
                query.push(("pageToken", token.as_str()));
            }

            let body = http::get_text(&self.agent, &url, &query, None)
                .map_err(|reason| KilnError::catalog(&self.id, reason))?
                .ok_or_else(|| KilnError::catalog(&self.id, format!("bucket {} not found", self.bucket)))?;

            let listing: ObjectListing = serde_json::from_str(&body).map_err(|e| {
                KilnError::catalog(&self.id, format!("malformed listing from {}: {}", url, e))
            })?;

            keys.extend(listing.items.into_iter().map(|item| item.name));
            match listing.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!("Listed {} object(s) in {}", keys.len(), self.bucket);
        Ok(keys)
    }

    /// The release a key names, if it matches the path template
    fn parse_key(&self, key: &str) -> Option<RemoteRelease> {
        let captures = self.path_template.captures(key)?;
        let id = ReleaseId::new(
            captures.name("release_name")?.as_str(),
            captures.name("release_version")?.as_str(),
        );
        let url = format!("{}/{}/{}", self.endpoint, self.bucket, key);

        match (captures.name("stemcell_os"), captures.name("stemcell_version")) {
            (Some(os), Some(version)) => Some(RemoteRelease::compiled(
                id,
                Stemcell::new(os.as_str(), version.as_str()),
                url,
            )),
            _ => Some(RemoteRelease::built(id, url)),
        }
    }

    fn match_keys(&self, keys: &[String], requirements: &ReleaseRequirementSet) -> Vec<RemoteRelease> {
        let candidates: Vec<RemoteRelease> = keys.iter().filter_map(|key| self.parse_key(key)).collect();

        requirements
            .requirements()
            .filter_map(|requirement| {
                let mut satisfying = candidates.iter().filter(|c| c.satisfies(requirement));
                let first = satisfying.next()?;
                // compiled artifacts win over built ones for the same release
                let compiled = std::iter::once(first)
                    .chain(satisfying)
                    .find(|c| matches!(c.artifact, Artifact::Compiled(_)));
                Some(compiled.unwrap_or(first).clone())
            })
            .collect()
    }
}

#[async_trait]
impl ReleaseSource for BucketReleaseSource {
    async fn get_matched_releases(
        &self,
        requirements: &ReleaseRequirementSet,
        _stemcell: &Stemcell,
    ) -> KilnResult<Vec<RemoteRelease>> {
        let this = self.clone();
        let requirements = requirements.clone();

        blocking(move || {
            let keys = this.list_keys()?;
            Ok(this.match_keys(&keys, &requirements))
        })
        .await
    }

    async fn download_releases(
        &self,
        releases_dir: &Path,
        matched: Vec<RemoteRelease>,
        concurrency: usize,
    ) -> KilnResult<LocalReleaseSet> {
        info!("Downloading {} release(s) from {}", matched.len(), self.id);
        let progress = DownloadProgress::new(&self.ui, &self.id, matched.len() as u64);
        pool::download_batch(&self.agent, releases_dir, matched, concurrency, None, progress).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::DEFAULT_PATH_TEMPLATE;
    use crate::release::ReleaseRequirement;
    use httpmock::prelude::*;
    use tempfile::TempDir;

    fn config(server: &MockServer) -> BucketConfig {
        BucketConfig {
            endpoint: server.base_url(),
            bucket: "compiled-releases".to_string(),
            prefix: None,
            path_template: DEFAULT_PATH_TEMPLATE.to_string(),
        }
    }

    fn source(server: &MockServer) -> BucketReleaseSource {
        BucketReleaseSource::new("compiled".to_string(), &config(server), UiContext::non_interactive())
            .unwrap()
    }

    fn requirements(names: &[(&str, &str)]) -> ReleaseRequirementSet {
        let stemcell = Stemcell::new("ubuntu-xenial", "190.0");
        names
            .iter()
            .map(|(name, version)| ReleaseRequirement::new(*name, *version, &stemcell))
            .collect()
    }

    #[tokio::test]
    async fn matches_compiled_and_built_keys() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/storage/v1/b/compiled-releases/o");
                then.status(200).body(
                    r#"{"items": [
                        {"name": "2.8/uaa-73.3.0-ubuntu-xenial-190.0.tgz"},
                        {"name": "2.8/uaa-73.3.0.tgz"},
                        {"name": "2.8/capi-1.87.0-ubuntu-xenial-170.0.tgz"},
                        {"name": "2.8/bpm-1.1.0.tgz"},
                        {"name": "2.8/README.md"}
                    ]}"#,
                );
            })
            .await;

        let found = source(&server)
            .get_matched_releases(
                &requirements(&[("uaa", "73.3.0"), ("capi", "1.87.0"), ("bpm", "1.1.0")]),
                &Stemcell::new("ubuntu-xenial", "190.0"),
            )
            .await
            .unwrap();

        assert_eq!(
            found,
            vec![
                RemoteRelease::built(
                    ReleaseId::new("bpm", "1.1.0"),
                    format!("{}/compiled-releases/2.8/bpm-1.1.0.tgz", server.base_url())
                ),
                RemoteRelease::compiled(
                    ReleaseId::new("uaa", "73.3.0"),
                    Stemcell::new("ubuntu-xenial", "190.0"),
                    format!(
                        "{}/compiled-releases/2.8/uaa-73.3.0-ubuntu-xenial-190.0.tgz",
                        server.base_url()
                    )
                ),
            ]
        );
    }

    #[tokio::test]
    async fn follows_page_tokens_and_prefix() {
        let server = MockServer::start_async().await;
        let second = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/storage/v1/b/compiled-releases/o")
                    .query_param("prefix", "2.8/")
                    .query_param("pageToken", "page-2");
                then.status(200)
                    .body(r#"{"items": [{"name": "2.8/bpm-1.1.0.tgz"}]}"#);
            })
            .await;
        let first = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/storage/v1/b/compiled-releases/o")
                    .query_param("prefix", "2.8/");
                then.status(200).body(
                    r#"{"items": [{"name": "2.8/uaa-73.3.0.tgz"}], "nextPageToken": "page-2"}"#,
                );
            })
            .await;

        let mut config = config(&server);
        config.prefix = Some("2.8/".to_string());
        let source =
            BucketReleaseSource::new("compiled".to_string(), &config, UiContext::non_interactive()).unwrap();

        let found = source
            .get_matched_releases(
                &requirements(&[("uaa", "73.3.0"), ("bpm", "1.1.0")]),
                &Stemcell::default(),
            )
            .await
            .unwrap();

        assert_eq!(found.len(), 2);
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn missing_bucket_is_catalog_error() {
        let server = MockServer::start_async().await;
        let err = source(&server)
            .get_matched_releases(&requirements(&[("uaa", "73.3.0")]), &Stemcell::default())
            .await
            .unwrap_err();
        assert!(matches!(err, KilnError::Catalog { .. }), "{}", err);
    }

    #[tokio::test]
    async fn downloads_object_by_key() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/compiled-releases/2.8/uaa-73.3.0-ubuntu-xenial-190.0.tgz");
                then.status(200).body("compiled uaa");
            })
            .await;

        let dir = TempDir::new().unwrap();
        let matched = vec![RemoteRelease::compiled(
            ReleaseId::new("uaa", "73.3.0"),
            Stemcell::new("ubuntu-xenial", "190.0"),
            format!(
                "{}/compiled-releases/2.8/uaa-73.3.0-ubuntu-xenial-190.0.tgz",
                server.base_url()
            ),
        )];

        let local = source(&server).download_releases(dir.path(), matched, 2).await.unwrap();

        assert_eq!(local.len(), 1);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("uaa-73.3.0-ubuntu-xenial-190.0.tgz")).unwrap(),
            "compiled uaa"
        );
    }

    #[test]
    fn invalid_path_template_is_config_error() {
        let mut config = BucketConfig::default();
        config.path_template = "(unclosed".to_string();
        let err = BucketReleaseSource::new("b".to_string(), &config, UiContext::non_interactive())
            .err()
            .unwrap();
        assert!(matches!(err, KilnError::SourceConfig { .. }));

        config.path_template = r"(?P<release_name>\w+)\.tgz".to_string();
        let err = BucketReleaseSource::new("b".to_string(), &config, UiContext::non_interactive())
            .err()
            .unwrap();
        assert!(err.to_string().contains("release_version"));
    }
}
