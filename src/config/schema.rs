//! Kilnfile schema
//!
//! ```yaml
//! release_sources:
//! - type: bosh.io
//!   publishable: true
//! - type: bucket
//!   id: compiled-releases
//!   bucket: my-compiled-releases
//! - type: pivnet
//!   product_slugs:
//!     p-isolation-segment: isolation-segment
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Root of a Kilnfile
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Kilnfile {
    /// Release sources in priority order
    pub release_sources: Vec<ReleaseSourceConfig>,
}

/// One entry under `release_sources`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseSourceConfig {
    /// Name used in logs and errors (defaults to the source type)
    #[serde(default)]
    pub id: Option<String>,

    /// Whether releases from this source may ship in a published tile
    #[serde(default)]
    pub publishable: bool,

    #[serde(flatten)]
    pub kind: SourceKind,
}

impl ReleaseSourceConfig {
    /// The configured id, or one derived from the source type
    pub fn id(&self) -> String {
        if let Some(ref id) = self.id {
            return id.clone();
        }
        match self.kind {
            SourceKind::BoshIo(_) => "bosh.io".to_string(),
            SourceKind::Bucket(ref bucket) => format!("bucket:{}", bucket.bucket),
            SourceKind::Pivnet(_) => "pivnet".to_string(),
        }
    }
}

/// Backend-specific settings, selected by `type`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SourceKind {
    #[serde(rename = "bosh.io")]
    BoshIo(BoshIoConfig),

    #[serde(rename = "bucket")]
    Bucket(BucketConfig),

    #[serde(rename = "pivnet")]
    Pivnet(PivnetConfig),
}

/// bosh.io community release catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoshIoConfig {
    pub endpoint: String,
}

impl Default for BoshIoConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://bosh.io".to_string(),
        }
    }
}

/// Object storage bucket holding release tarballs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketConfig {
    /// Storage endpoint serving the JSON object listing API
    pub endpoint: String,

    pub bucket: String,

    /// Only list keys under this prefix
    pub prefix: Option<String>,

    /// Regex over object keys with named groups `release_name`,
    /// `release_version` and optionally `stemcell_os`, `stemcell_version`
    pub path_template: String,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://storage.googleapis.com".to_string(),
            bucket: String::new(),
            prefix: None,
            path_template: DEFAULT_PATH_TEMPLATE.to_string(),
        }
    }
}

/// `<name>-<version>.tgz` or `<name>-<version>-<os>-<os version>.tgz` anywhere in the bucket
pub const DEFAULT_PATH_TEMPLATE: &str = r"(?:^|/)(?P<release_name>[a-z][a-z0-9_-]*)-(?P<release_version>\d+(?:\.\d+)*)(?:-(?P<stemcell_os>[a-z][a-z0-9-]*)-(?P<stemcell_version>\d+(?:\.\d+)*))?\.tgz$";

/// Release-notes style product catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PivnetConfig {
    pub endpoint: String,

    /// API token; falls back to `PIVNET_TOKEN`
    pub token: Option<String>,

    /// Release name to product slug, when they differ
    pub product_slugs: BTreeMap<String, String>,
}

impl Default for PivnetConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://network.pivotal.io".to_string(),
            token: None,
            product_slugs: BTreeMap::new(),
        }
    }
}
