//! Release data model
//!
//! Requirements come from Kilnfile.lock, local releases from the releases
//! directory, remote releases from a release source catalog. Everything is
//! keyed by `ReleaseId` (name + version).

pub mod checksum;
pub mod inventory;
mod model;
mod sets;

pub use inventory::LocalReleaseDirectory;
pub use model::{
    Artifact, LocalRelease, ReleaseId, ReleaseRequirement, RemoteRelease, Satisfies, Stemcell,
};
pub use sets::{LocalReleaseSet, ReleaseRequirementSet};
