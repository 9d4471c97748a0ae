//! bosh.io community release catalog
//!
//! bosh.io indexes releases by GitHub repository, and a release named `uaa`
//! may live in any of a handful of organizations under a handful of
//! repository spellings. Lookups query every organization/suffix pair in a
//! fixed order and take the first repository that lists the exact version.

use super::{blocking, endpoint_base, http, pool, ReleaseSource};
use crate::error::{KilnError, KilnResult};
use crate::release::{LocalReleaseSet, ReleaseRequirement, ReleaseRequirementSet, RemoteRelease, Stemcell};
use crate::ui::{DownloadProgress, UiContext};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};
use ureq::Agent;

/// Organizations searched, highest priority first
pub const ORGANIZATIONS: &[&str] = &[
    "cloudfoundry",
    "pivotal-cf",
    "cloudfoundry-incubator",
    "pivotal-cf-experimental",
    "bosh-packages",
    "cppforlife",
    "vito",
    "flavorjones",
    "xoebus",
    "dpb587",
    "jamiemonserrate",
    "concourse",
    "cf-platform-eng",
    "starkandwayne",
    "cloudfoundry-community",
    "frodenas",
    "pivotal",
];

/// Repository name suffixes tried for each organization
pub const SUFFIXES: &[&str] = &["", "-release", "-bosh-release", "-boshrelease"];

const SOURCE_ID: &str = "bosh.io";

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    version: String,
}

/// Release source backed by the bosh.io catalog API
#[derive(Clone)]
pub struct BoshIoReleaseSource {
    endpoint: String,
    agent: Agent,
    ui: UiContext,
}

impl BoshIoReleaseSource {
    pub fn new(endpoint: &str, ui: UiContext) -> Self {
        Self {
            endpoint: endpoint_base(endpoint),
            agent: Agent::new_with_defaults(),
            ui,
        }
    }

    /// Query every organization/suffix pair for `requirement`
    fn lookup(&self, requirement: &ReleaseRequirement) -> KilnResult<Option<RemoteRelease>> {
        for org in ORGANIZATIONS {
            for suffix in SUFFIXES {
                let repository = format!("{}{}", requirement.name, suffix);
                if self.lists_version(org, &repository, &requirement.version)? {
                    let url = download_url(
                        &self.endpoint,
                        org,
                        &requirement.name,
                        suffix,
                        &requirement.version,
                    );
                    debug!("Found {} at {}", requirement.id(), url);
                    return Ok(Some(RemoteRelease::built(requirement.id(), url)));
                }
            }
        }
        Ok(None)
    }

    /// Whether `github.com/{org}/{repository}` carries `version`.
    ///
    /// An unknown repository answers `null` or 404; both mean no.
    fn lists_version(&self, org: &str, repository: &str, version: &str) -> KilnResult<bool> {
        let url = format!(
            "{}/api/v1/releases/github.com/{}/{}",
            self.endpoint, org, repository
        );

        let body = match http::get_text(&self.agent, &url, &[], None)
            .map_err(|reason| KilnError::catalog(SOURCE_ID, reason))?
        {
            Some(body) => body,
            None => return Ok(false),
        };

        let entries: Option<Vec<CatalogEntry>> = serde_json::from_str(&body).map_err(|e| {
            KilnError::catalog(SOURCE_ID, format!("malformed response from {}: {}", url, e))
        })?;

        Ok(entries
            .unwrap_or_default()
            .iter()
            .any(|entry| entry.version == version))
    }
}

/// `{server}/d/github.com/{org}/{stem}?v={version}`
///
/// The stem is the repository that matched, except that a bare name gets
/// `-release` appended unless it already ends with it.
pub fn download_url(server: &str, org: &str, name: &str, suffix: &str, version: &str) -> String {
    let stem = if suffix.is_empty() && !name.ends_with("-release") {
        format!("{}-release", name)
    } else {
        format!("{}{}", name, suffix)
    };
    format!("{}/d/github.com/{}/{}?v={}", server, org, stem, version)
}

#[async_trait]
impl ReleaseSource for BoshIoReleaseSource {
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
        info!("Downloading {} release(s) from {}", matched.len(), SOURCE_ID);
        let progress = DownloadProgress::new(&self.ui, SOURCE_ID, matched.len() as u64);
        pool::download_batch(&self.agent, releases_dir, matched, concurrency, None, progress).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::release::ReleaseId;
    use httpmock::prelude::*;
    use regex::Regex;
    use tempfile::TempDir;

    fn built(name: &str, version: &str, url: String) -> RemoteRelease {
        RemoteRelease::built(ReleaseId::new(name, version), url)
    }

    fn requirement(name: &str, version: &str) -> ReleaseRequirement {
        ReleaseRequirement::new(name, version, &Stemcell::new("ubuntu-xenial", "190.0.0"))
    }

    fn ignored_stemcell() -> Stemcell {
        Stemcell::new("ignored", "ignored")
    }

    fn source(server: &MockServer) -> BoshIoReleaseSource {
        BoshIoReleaseSource::new(&server.base_url(), UiContext::non_interactive())
    }

    #[tokio::test]
    async fn returns_built_releases_which_exist() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path_matches(Regex::new("^/api/v1/releases/github.com/pivotal-cf/cf-rabbitmq").unwrap());
                then.status(200).body(r#"[{"version": "268.0.0"}]"#);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path_matches(Regex::new("^/api/v1/releases/github.com/[^/]+/cf-rabbitmq").unwrap());
                then.status(200).body("null");
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path_matches(Regex::new("^/api/v1/releases/github.com/[^/]+/uaa").unwrap());
                then.status(200).body(r#"[{"version": "73.3.0"}]"#);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path_matches(Regex::new("^/api/v1/releases/github.com/[^/]+/zzz").unwrap());
                then.status(200).body("null");
            })
            .await;

        let requirements: ReleaseRequirementSet = [
            requirement("uaa", "73.3.0"),
            requirement("zzz", "999"),
            requirement("cf-rabbitmq", "268.0.0"),
        ]
        .into_iter()
        .collect();

        let mut found = source(&server)
            .get_matched_releases(&requirements, &ignored_stemcell())
            .await
            .unwrap();
        found.sort_by(|a, b| a.id.cmp(&b.id));

        assert_eq!(
            found,
            vec![
                built(
                    "cf-rabbitmq",
                    "268.0.0",
                    format!("{}/d/github.com/pivotal-cf/cf-rabbitmq-release?v=268.0.0", server.base_url())
                ),
                built(
                    "uaa",
                    "73.3.0",
                    format!("{}/d/github.com/cloudfoundry/uaa-release?v=73.3.0", server.base_url())
                ),
            ]
        );
    }

    #[tokio::test]
    async fn existing_release_without_version_is_not_matched() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path_matches(Regex::new("^/api/v1/releases/github.com/").unwrap());
                then.status(200).body(r#"[{"version": "4.0.4"}]"#);
            })
            .await;

        let requirements: ReleaseRequirementSet = [requirement("my-release", "1.2.3")].into_iter().collect();
        let found = source(&server)
            .get_matched_releases(&requirements, &ignored_stemcell())
            .await
            .unwrap();

        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn searches_every_org_and_suffix() {
        let release_name = "my-release";
        let release_version = "1.2.3";

        for (org, suffix) in [
            ("cloudfoundry", ""),
            ("cloudfoundry", "-release"),
            ("cloudfoundry", "-bosh-release"),
            ("cloudfoundry", "-boshrelease"),
            ("pivotal-cf", ""),
            ("pivotal-cf", "-release"),
            ("pivotal-cf", "-bosh-release"),
            ("pivotal-cf", "-boshrelease"),
            ("frodenas", ""),
            ("frodenas", "-release"),
            ("frodenas", "-bosh-release"),
            ("frodenas", "-boshrelease"),
        ] {
            let server = MockServer::start_async().await;
            let path = format!("/api/v1/releases/github.com/{}/{}{}", org, release_name, suffix);
            server
                .mock_async(|when, then| {
                    when.method(GET).path(path.as_str());
                    then.status(200)
                        .body(format!(r#"[{{"version": "{}"}}]"#, release_version));
                })
                .await;
            server
                .mock_async(|when, then| {
                    when.method(GET)
                        .path_matches(Regex::new("^/api/v1/releases/github.com/").unwrap());
                    then.status(200).body("null");
                })
                .await;

            let requirements: ReleaseRequirementSet = [ReleaseRequirement::new(
                release_name,
                release_version,
                &Stemcell::new("generic-os", "4.5.6"),
            )]
            .into_iter()
            .collect();

            let found = source(&server)
                .get_matched_releases(&requirements, &ignored_stemcell())
                .await
                .unwrap();

            let expected = format!(
                "{}/d/github.com/{}/{}{}?v={}",
                server.base_url(),
                org,
                release_name,
                suffix,
                release_version
            );
            assert_eq!(
                found,
                vec![built(release_name, release_version, expected)],
                "{} {}",
                org,
                suffix
            );
        }
    }

    #[tokio::test]
    async fn not_found_repositories_are_skipped() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/releases/github.com/pivotal/routing-boshrelease");
                then.status(200).body(r#"[{"version": "0.1.0"}, {"version": "0.2.0"}]"#);
            })
            .await;

        let requirements: ReleaseRequirementSet = [requirement("routing", "0.2.0")].into_iter().collect();
        let found = source(&server)
            .get_matched_releases(&requirements, &ignored_stemcell())
            .await
            .unwrap();

        assert_eq!(
            found,
            vec![built(
                "routing",
                "0.2.0",
                format!("{}/d/github.com/pivotal/routing-boshrelease?v=0.2.0", server.base_url())
            )]
        );
    }

    #[tokio::test]
    async fn server_error_is_catalog_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET);
                then.status(500);
            })
            .await;

        let requirements: ReleaseRequirementSet = [requirement("uaa", "73.3.0")].into_iter().collect();
        let err = source(&server)
            .get_matched_releases(&requirements, &ignored_stemcell())
            .await
            .unwrap_err();

        assert!(matches!(err, KilnError::Catalog { .. }), "{}", err);
    }

    #[tokio::test]
    async fn malformed_body_is_catalog_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET);
                then.status(200).body("<html>not json</html>");
            })
            .await;

        let requirements: ReleaseRequirementSet = [requirement("uaa", "73.3.0")].into_iter().collect();
        let err = source(&server)
            .get_matched_releases(&requirements, &ignored_stemcell())
            .await
            .unwrap_err();

        assert!(matches!(err, KilnError::Catalog { .. }), "{}", err);
    }

    #[tokio::test]
    async fn downloads_matched_releases() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/d/github.com/cloudfoundry/uaa-release")
                    .query_param("v", "73.3.0");
                then.status(200).body("uaa tarball");
            })
            .await;

        let dir = TempDir::new().unwrap();
        let matched = vec![built(
            "uaa",
            "73.3.0",
            download_url(&server.base_url(), "cloudfoundry", "uaa", "", "73.3.0"),
        )];

        let local = source(&server)
            .download_releases(dir.path(), matched, 0)
            .await
            .unwrap();

        let id = ReleaseId::new("uaa", "73.3.0");
        assert_eq!(local.get(&id).unwrap().path, dir.path().join("uaa-73.3.0.tgz"));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("uaa-73.3.0.tgz")).unwrap(),
            "uaa tarball"
        );
    }

    #[test]
    fn download_url_stem() {
        assert_eq!(
            download_url("https://bosh.io", "cloudfoundry", "uaa", "", "73.3.0"),
            "https://bosh.io/d/github.com/cloudfoundry/uaa-release?v=73.3.0"
        );
        assert_eq!(
            download_url("https://bosh.io", "cloudfoundry", "my-release", "", "1"),
            "https://bosh.io/d/github.com/cloudfoundry/my-release?v=1"
        );
        assert_eq!(
            download_url("https://bosh.io", "pivotal-cf", "cf-rabbitmq", "-boshrelease", "1"),
            "https://bosh.io/d/github.com/pivotal-cf/cf-rabbitmq-boshrelease?v=1"
        );
    }

    #[test]
    fn search_order() {
        assert_eq!(ORGANIZATIONS.first(), Some(&"cloudfoundry"));
        assert_eq!(ORGANIZATIONS.last(), Some(&"pivotal"));
        assert_eq!(ORGANIZATIONS.len(), 17);
        assert_eq!(SUFFIXES, &["", "-release", "-bosh-release", "-boshrelease"]);
    }
}
