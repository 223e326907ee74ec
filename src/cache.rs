//! Per-environment memo of fully resolved setting values.

use std::collections::HashMap;

use crate::value::SettingValue;

/// Caches fully interpolated values keyed by environment.
///
/// The cache is never pruned: any mutation anywhere in the store clears
/// it entirely, so a cached entry is only ever trusted between
/// invalidation events.
#[derive(Debug, Default)]
pub struct ResolutionCache {
    entries: HashMap<Option<String>, HashMap<String, SettingValue>>,
}

impl ResolutionCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached resolved value for `name` under `environment`.
    pub fn get(&self, environment: Option<&str>, name: &str) -> Option<&SettingValue> {
        self.entries
            .get(&environment.map(str::to_string))
            .and_then(|values| values.get(name))
    }

    /// Memoizes a resolved value for `name` under `environment`.
    pub fn insert(&mut self, environment: Option<&str>, name: impl Into<String>, value: SettingValue) {
        self.entries
            .entry(environment.map(str::to_string))
            .or_default()
            .insert(name.into(), value);
    }

    /// Drops every entry for every environment.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
