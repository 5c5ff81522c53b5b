//! Comparator registry: per-type dispatch.
//!
//! The registry is built once through [`RegistryBuilder`] and is immutable
//! afterwards; callers hold it by reference or behind an `Arc`.
//!
//! ## Resolution
//!
//! Among comparators matching `(extraction_type, shape)` the highest
//! priority wins; ties go to the one registered first. When nothing
//! matches, the fallback is returned, so resolution is total.

mod builtin;
mod comparator;

pub use builtin::{
    GenericTableComparator, KeyValueComparator, ProfileComparator, GENERIC_TABLE_PRIORITY,
};
pub use comparator::{
    compose, group_by_category, kv, CompareContext, Comparator, ComparatorCapability,
    ComparisonView, PayloadSource, UNCATEGORIZED,
};

use serde::Serialize;
use std::sync::Arc;

use crate::canonical::canonical_hash_hex;
use crate::policy::{builtin_profiles, ExtractionProfile};
use crate::types::ShapeDescriptor;

/// Fingerprint entry of one registered comparator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComparatorRef {
    /// Comparator name.
    pub name: String,
    /// Declared priority.
    pub priority: i32,
}

/// Collects comparators before freezing them into a [`ComparatorRegistry`].
pub struct RegistryBuilder {
    entries: Vec<Arc<dyn Comparator>>,
    fallback: Option<Arc<dyn Comparator>>,
}

impl RegistryBuilder {
    /// Empty builder.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            fallback: None,
        }
    }

    /// Register a comparator.
    pub fn register(mut self, comparator: impl Comparator + 'static) -> Self {
        self.entries.push(Arc::new(comparator));
        self
    }

    /// Register a shared comparator.
    pub fn register_arc(mut self, comparator: Arc<dyn Comparator>) -> Self {
        self.entries.push(comparator);
        self
    }

    /// Register one profile-driven comparator per profile.
    pub fn register_profiles(self, profiles: impl IntoIterator<Item = ExtractionProfile>) -> Self {
        profiles
            .into_iter()
            .fold(self, |builder, profile| builder.register(ProfileComparator::new(profile)))
    }

    /// Replace the fallback (defaults to [`KeyValueComparator`]).
    pub fn fallback(mut self, comparator: impl Comparator + 'static) -> Self {
        self.fallback = Some(Arc::new(comparator));
        self
    }

    /// Freeze the registry.
    pub fn build(self) -> ComparatorRegistry {
        let fallback = self
            .fallback
            .unwrap_or_else(|| Arc::new(KeyValueComparator::new()));

        let refs: Vec<ComparatorRef> = self
            .entries
            .iter()
            .chain(std::iter::once(&fallback))
            .map(|c| ComparatorRef {
                name: c.name().to_string(),
                priority: c.priority(),
            })
            .collect();

        ComparatorRegistry {
            fingerprint: canonical_hash_hex(&refs),
            entries: self.entries,
            fallback,
        }
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable set of comparators with a fallback.
#[derive(Clone)]
pub struct ComparatorRegistry {
    entries: Vec<Arc<dyn Comparator>>,
    fallback: Arc<dyn Comparator>,
    fingerprint: String,
}

impl ComparatorRegistry {
    /// Start building a registry.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Built-in profiles, the generic table comparator, key/value fallback.
    pub fn with_defaults() -> Self {
        Self::with_profiles(Vec::new())
    }

    /// Defaults plus additional profiles.
    ///
    /// Extra profiles are registered after the built-ins, so on equal
    /// priority a built-in profile for the same type still wins.
    pub fn with_profiles(extra: Vec<ExtractionProfile>) -> Self {
        RegistryBuilder::new()
            .register_profiles(builtin_profiles())
            .register_profiles(extra)
            .register(GenericTableComparator::new())
            .build()
    }

    /// Select the comparator for an extraction type and payload shape.
    pub fn resolve(&self, extraction_type: &str, shape: &ShapeDescriptor) -> &dyn Comparator {
        let mut best: Option<&Arc<dyn Comparator>> = None;

        for candidate in &self.entries {
            if !candidate.matches(extraction_type, shape) {
                continue;
            }
            match best {
                Some(current) if current.priority() >= candidate.priority() => {}
                _ => best = Some(candidate),
            }
        }

        let chosen = best.unwrap_or(&self.fallback);
        tracing::debug!(
            extraction_type,
            comparator = chosen.name(),
            priority = chosen.priority(),
            "resolved comparator"
        );
        chosen.as_ref()
    }

    /// The fallback comparator.
    pub fn fallback(&self) -> &dyn Comparator {
        self.fallback.as_ref()
    }

    /// Registered comparators (without the fallback), in registration order.
    pub fn list(&self) -> Vec<ComparatorRef> {
        self.entries
            .iter()
            .map(|c| ComparatorRef {
                name: c.name().to_string(),
                priority: c.priority(),
            })
            .collect()
    }

    /// Fingerprint over comparator names and priorities.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Number of registered comparators (without the fallback).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether only the fallback is available.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ComparatorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for ComparatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComparatorRegistry")
            .field("entries", &self.list())
            .field("fallback", &self.fallback.name())
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}
