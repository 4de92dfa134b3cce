//! Extension override resolution.
//!
//! Every resource type has an ancestor chain (`discussions` →
//! `abstract-database-resource` → `abstract-resource`). A patch applies to
//! a type when its target is anywhere on that chain. The resolver produces
//! a [`MergePlan`]: applicable patches grouped by chain level, most
//! specific first, registration order within a level.
//!
//! The registry applies a plan root-most level first, so for colliding
//! keys the most specific target wins, and within one level the later
//! registration wins. Additions accumulate either way.

use crate::error::ConfigurationError;
use crate::extend::Patch;
use std::collections::{BTreeMap, BTreeSet};

/// Resource type → `[type, nearest ancestor, ..., root]`.
#[derive(Debug, Clone, Default)]
pub struct AncestorTable {
    chains: BTreeMap<String, Vec<String>>,
}

impl AncestorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a resource type and its ancestors (nearest first).
    pub fn insert(&mut self, resource_type: &str, ancestors: Vec<String>) -> Result<(), ConfigurationError> {
        if self.chains.contains_key(resource_type) {
            return Err(ConfigurationError::DuplicateResource(resource_type.to_string()));
        }
        let mut chain = Vec::with_capacity(ancestors.len() + 1);
        chain.push(resource_type.to_string());
        chain.extend(ancestors);

        let mut seen = BTreeSet::new();
        if !chain.iter().all(|t| seen.insert(t.as_str())) {
            return Err(ConfigurationError::CyclicAncestors(resource_type.to_string()));
        }
        self.chains.insert(resource_type.to_string(), chain);
        Ok(())
    }

    /// The full chain of a registered type, the type itself first.
    pub fn chain(&self, resource_type: &str) -> Option<&[String]> {
        self.chains.get(resource_type).map(Vec::as_slice)
    }

    /// How far `target` sits from `resource_type` on its chain (0 = the
    /// type itself). `None` when the target does not apply.
    pub fn level(&self, resource_type: &str, target: &str) -> Option<usize> {
        self.chain(resource_type)?.iter().position(|t| t == target)
    }

    /// Whether a name is a registered type or appears as an ancestor.
    pub fn knows(&self, name: &str) -> bool {
        self.chains.values().any(|chain| chain.iter().any(|t| t == name))
    }

    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.chains.keys().map(String::as_str)
    }
}

/// Applicable patches for one type, grouped by chain level.
#[derive(Debug)]
pub struct MergePlan<'a> {
    resource_type: String,
    /// `levels[0]` holds patches targeting the type itself.
    levels: Vec<Vec<&'a Patch>>,
}

impl<'a> MergePlan<'a> {
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// Patches most specific level first, registration order within a level.
    pub fn by_specificity(&self) -> impl Iterator<Item = (usize, &'a Patch)> + '_ {
        self.levels
            .iter()
            .enumerate()
            .flat_map(|(level, patches)| patches.iter().map(move |p| (level, *p)))
    }

    /// Order in which patches are folded over the core declarations:
    /// root-most level first, registration order within a level.
    pub fn application_order(&self) -> impl Iterator<Item = (usize, &'a Patch)> + '_ {
        self.levels
            .iter()
            .enumerate()
            .rev()
            .flat_map(|(level, patches)| patches.iter().map(move |p| (level, *p)))
    }

    pub fn len(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Selects and orders the patches that apply to a resource type.
pub struct OverrideResolver<'a> {
    table: &'a AncestorTable,
    patches: &'a [Patch],
}

impl<'a> OverrideResolver<'a> {
    pub fn new(table: &'a AncestorTable, patches: &'a [Patch]) -> Self {
        Self { table, patches }
    }

    pub fn resolve(&self, resource_type: &str) -> Result<MergePlan<'a>, ConfigurationError> {
        let chain = self
            .table
            .chain(resource_type)
            .ok_or_else(|| ConfigurationError::UnknownResource(resource_type.to_string()))?;
        let mut levels: Vec<Vec<&'a Patch>> = vec![Vec::new(); chain.len()];

        // `patches` is in registration order, so bucketing keeps it stable.
        for patch in self.patches {
            if let Some(level) = chain.iter().position(|t| *t == patch.target) {
                levels[level].push(patch);
            }
        }
        Ok(MergePlan {
            resource_type: resource_type.to_string(),
            levels,
        })
    }

    /// Fails on the first patch whose target is neither a registered type
    /// nor a declared ancestor.
    pub fn check_targets(&self) -> Result<(), ConfigurationError> {
        match self.patches.iter().find(|p| !self.table.knows(&p.target)) {
            Some(p) => Err(ConfigurationError::UnknownTarget(p.target.clone())),
            None => Ok(()),
        }
    }
}
