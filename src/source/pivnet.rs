//! Release-notes product catalog source
//!
//! Each release maps to a product slug. The product's release list is
//! searched for the exact version and the first `.tgz` product file of that
//! release is the artifact. Every request carries the API token.

use super::{blocking, endpoint_base, http, pool, ReleaseSource};
use crate::config::schema::PivnetConfig;
use crate::error::{KilnError, KilnResult};
use crate::release::{
    LocalReleaseSet, ReleaseRequirement, ReleaseRequirementSet, RemoteRelease, Stemcell,
};
use crate::ui::{DownloadProgress, UiContext};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};
use ureq::Agent;

#[derive(Debug, Deserialize)]
struct ProductReleases {
    #[serde(default)]
    releases: Vec<ProductRelease>,
}

#[derive(Debug, Deserialize)]
struct ProductRelease {
    id: u64,
    version: String,
}

#[derive(Debug, Deserialize)]
struct ProductFiles {
    #[serde(default)]
    product_files: Vec<ProductFile>,
}

#[derive(Debug, Deserialize)]
struct ProductFile {
    #[serde(default)]
    aws_object_key: String,
    #[serde(rename = "_links")]
    links: ProductFileLinks,
}

#[derive(Debug, Deserialize)]
struct ProductFileLinks {
    download: Link,
}

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
}

/// Release source backed by a product release catalog
#[derive(Clone)]
pub struct PivnetReleaseSource {
    id: String,
    endpoint: String,
    authorization: String,
    product_slugs: BTreeMap<String, String>,
    agent: Agent,
    ui: UiContext,
}

impl PivnetReleaseSource {
    pub fn new(id: String, config: &PivnetConfig, token: String, ui: UiContext) -> Self {
        Self {
            id,
            endpoint: endpoint_base(&config.endpoint),
            authorization: format!("Token {}", token),
            product_slugs: config.product_slugs.clone(),
            agent: Agent::new_with_defaults(),
            ui,
        }
    }

    /// Product slug for a release; the release name unless remapped
    fn slug<'a>(&'a self, name: &'a str) -> &'a str {
        self.product_slugs.get(name).map(String::as_str).unwrap_or(name)
    }

    /// GET and decode; `None` when the resource does not exist
    fn get_json<T: DeserializeOwned>(&self, url: &str) -> KilnResult<Option<T>> {
        let body = match http::get_text(&self.agent, url, &[], Some(&self.authorization))
            .map_err(|reason| KilnError::catalog(&self.id, reason))?
        {
            Some(body) => body,
            None => return Ok(None),
        };

        serde_json::from_str(&body)
            .map(Some)
            .map_err(|e| KilnError::catalog(&self.id, format!("malformed response from {}: {}", url, e)))
    }

    fn lookup(&self, requirement: &ReleaseRequirement) -> KilnResult<Option<RemoteRelease>> {
        let product = format!("{}/api/v2/products/{}", self.endpoint, self.slug(&requirement.name));

        let releases: ProductReleases = match self.get_json(&format!("{}/releases", product))? {
            Some(releases) => releases,
            None => {
                debug!("No product {} in {}", self.slug(&requirement.name), self.id);
                return Ok(None);
            }
        };

        let release = match releases
            .releases
            .iter()
            .find(|release| release.version == requirement.version)
        {
            Some(release) => release,
            None => return Ok(None),
        };

        let files: ProductFiles =
            match self.get_json(&format!("{}/releases/{}/product_files", product, release.id))? {
                Some(files) => files,
                None => return Ok(None),
            };

        Ok(files
            .product_files
            .into_iter()
            .find(|file| file.aws_object_key.ends_with(".tgz"))
            .map(|file| RemoteRelease::built(requirement.id(), file.links.download.href)))
    }
}

#[async_trait]
impl ReleaseSource for PivnetReleaseSource {
    async fn get_matched_releases(
        &self,
        requirements: &ReleaseRequirementSet,
        _stemcell: &Stemcell,
    ) -> KilnResult<Vec<RemoteRelease>> {
        let this = self.clone();
        let requirements: Vec<ReleaseRequirement> = requirements.requirements().cloned().collect();

        blocking(move || {
            let mut matched = Vec::new();
            for requirement in &requirements {
                if let Some(release) = this.lookup(requirement)? {
                    matched.push(release);
                }
            }
            Ok(matched)
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
        pool::download_batch(
            &self.agent,
            releases_dir,
            matched,
            concurrency,
            Some(self.authorization.clone()),
            progress,
        )
        .await
    }
}
