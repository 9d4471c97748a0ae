//! Release identity, requirements and artifact variants

use super::checksum;
use crate::error::KilnResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Unique key for a release across every set
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReleaseId {
    pub name: String,
    pub version: String,
}

impl ReleaseId {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for ReleaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.version)
    }
}

/// Base OS image a compiled release was built against
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stemcell {
    pub os: String,
    pub version: String,
}

impl Stemcell {
    pub fn new(os: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            version: version.into(),
        }
    }

    /// Parse the `os/version` form used in release manifests
    pub fn parse_slashed(value: &str) -> Option<Self> {
        let (os, version) = value.split_once('/')?;
        if os.is_empty() || version.is_empty() {
            return None;
        }
        Some(Self::new(os, version))
    }
}

/// An exact release built against an exact stemcell
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReleaseRequirement {
    pub name: String,
    pub version: String,
    pub stemcell_os: String,
    pub stemcell_version: String,
}

impl ReleaseRequirement {
    pub fn new(name: impl Into<String>, version: impl Into<String>, stemcell: &Stemcell) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            stemcell_os: stemcell.os.clone(),
            stemcell_version: stemcell.version.clone(),
        }
    }

    pub fn id(&self) -> ReleaseId {
        ReleaseId::new(&self.name, &self.version)
    }
}

/// Whether a candidate artifact fulfills a requirement
pub trait Satisfies {
    fn satisfies(&self, requirement: &ReleaseRequirement) -> bool;
}

/// The closed set of artifact flavours
///
/// Built artifacts are stemcell-agnostic. Compiled artifacts only satisfy
/// requirements naming the exact stemcell they were compiled against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Artifact {
    Built,
    Compiled(Stemcell),
}

impl Artifact {
    fn satisfies(&self, id: &ReleaseId, requirement: &ReleaseRequirement) -> bool {
        if id.name != requirement.name || id.version != requirement.version {
            return false;
        }
        match self {
            Self::Built => true,
            Self::Compiled(stemcell) => {
                stemcell.os == requirement.stemcell_os
                    && stemcell.version == requirement.stemcell_version
            }
        }
    }

    /// Canonical on-disk filename for a release of this flavour
    pub fn standardized_filename(&self, id: &ReleaseId) -> String {
        match self {
            Self::Built => format!("{}-{}.tgz", id.name, id.version),
            Self::Compiled(stemcell) => format!(
                "{}-{}-{}-{}.tgz",
                id.name, id.version, stemcell.os, stemcell.version
            ),
        }
    }
}

/// A release located in a remote catalog, not yet downloaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRelease {
    pub id: ReleaseId,
    pub artifact: Artifact,
    pub url: String,
}

impl RemoteRelease {
    pub fn built(id: ReleaseId, url: impl Into<String>) -> Self {
        Self {
            id,
            artifact: Artifact::Built,
            url: url.into(),
        }
    }

    pub fn compiled(id: ReleaseId, stemcell: Stemcell, url: impl Into<String>) -> Self {
        Self {
            id,
            artifact: Artifact::Compiled(stemcell),
            url: url.into(),
        }
    }

    pub fn standardized_filename(&self) -> String {
        self.artifact.standardized_filename(&self.id)
    }

    /// The local release this becomes once written to `path`
    pub fn materialize(&self, path: PathBuf) -> LocalRelease {
        LocalRelease {
            id: self.id.clone(),
            artifact: self.artifact.clone(),
            path,
        }
    }
}

impl Satisfies for RemoteRelease {
    fn satisfies(&self, requirement: &ReleaseRequirement) -> bool {
        self.artifact.satisfies(&self.id, requirement)
    }
}

/// A release materialized in the local releases directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalRelease {
    pub id: ReleaseId,
    pub artifact: Artifact,
    pub path: PathBuf,
}

impl LocalRelease {
    pub fn new(id: ReleaseId, artifact: Artifact, path: PathBuf) -> Self {
        Self { id, artifact, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// SHA-1 of the file content, hex encoded
    pub fn sha1(&self) -> KilnResult<String> {
        checksum::sha1_file(&self.path)
    }
}

impl Satisfies for LocalRelease {
    fn satisfies(&self, requirement: &ReleaseRequirement) -> bool {
        self.artifact.satisfies(&self.id, requirement)
    }
}
