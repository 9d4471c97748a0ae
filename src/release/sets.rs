//! Requirement and local release sets
//!
//! Both sets are persistent values: every transform returns a new set and
//! leaves the receiver and its arguments untouched.

use super::model::{LocalRelease, ReleaseId, ReleaseRequirement, Satisfies};
use crate::lock::KilnfileLock;
use std::collections::BTreeMap;

/// Releases that must be present locally, keyed by id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseRequirementSet(BTreeMap<ReleaseId, ReleaseRequirement>);

impl ReleaseRequirementSet {
    /// One requirement per pinned release, each on the lock's stemcell
    pub fn from_lock(lock: &KilnfileLock) -> Self {
        lock.releases
            .iter()
            .map(|r| ReleaseRequirement::new(&r.name, &r.version, &lock.stemcell))
            .collect()
    }

    /// Split `local` against this set into (satisfied, missing, extra).
    ///
    /// A local release that is keyed by a required id but does not satisfy
    /// the requirement lands in both `missing` (by its requirement) and
    /// `extra` (by its artifact).
    pub fn partition(
        &self,
        local: &LocalReleaseSet,
    ) -> (LocalReleaseSet, ReleaseRequirementSet, LocalReleaseSet) {
        let mut satisfied = BTreeMap::new();
        let mut missing = BTreeMap::new();
        let mut extra = local.0.clone();

        for (id, requirement) in &self.0 {
            match local.get(id) {
                Some(release) if release.satisfies(requirement) => {
                    satisfied.insert(id.clone(), release.clone());
                    extra.remove(id);
                }
                _ => {
                    missing.insert(id.clone(), requirement.clone());
                }
            }
        }

        (
            LocalReleaseSet(satisfied),
            ReleaseRequirementSet(missing),
            LocalReleaseSet(extra),
        )
    }

    /// A copy of this set without the given ids
    pub fn without_releases<'a>(&self, ids: impl IntoIterator<Item = &'a ReleaseId>) -> Self {
        let mut remaining = self.0.clone();
        for id in ids {
            remaining.remove(id);
        }
        Self(remaining)
    }

    pub fn get(&self, id: &ReleaseId) -> Option<&ReleaseRequirement> {
        self.0.get(id)
    }

    pub fn contains(&self, id: &ReleaseId) -> bool {
        self.0.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ReleaseId> {
        self.0.keys()
    }

    pub fn requirements(&self) -> impl Iterator<Item = &ReleaseRequirement> {
        self.0.values()
    }
}

impl FromIterator<ReleaseRequirement> for ReleaseRequirementSet {
    fn from_iter<I: IntoIterator<Item = ReleaseRequirement>>(iter: I) -> Self {
        Self(iter.into_iter().map(|r| (r.id(), r)).collect())
    }
}

/// Releases present in the local releases directory, keyed by id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalReleaseSet(BTreeMap<ReleaseId, LocalRelease>);

impl LocalReleaseSet {
    /// A copy of this set with `other` merged in; entries in `other` win
    pub fn with(&self, other: &LocalReleaseSet) -> Self {
        let mut merged = self.0.clone();
        merged.extend(other.0.iter().map(|(id, r)| (id.clone(), r.clone())));
        Self(merged)
    }

    pub fn get(&self, id: &ReleaseId) -> Option<&LocalRelease> {
        self.0.get(id)
    }

    pub fn contains(&self, id: &ReleaseId) -> bool {
        self.0.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn release_ids(&self) -> impl Iterator<Item = &ReleaseId> {
        self.0.keys()
    }

    pub fn releases(&self) -> impl Iterator<Item = &LocalRelease> {
        self.0.values()
    }
}

impl FromIterator<LocalRelease> for LocalReleaseSet {
    fn from_iter<I: IntoIterator<Item = LocalRelease>>(iter: I) -> Self {
        Self(iter.into_iter().map(|r| (r.id.clone(), r)).collect())
    }
}

impl IntoIterator for LocalReleaseSet {
    type Item = LocalRelease;
    type IntoIter = std::collections::btree_map::IntoValues<ReleaseId, LocalRelease>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_values()
    }
}
