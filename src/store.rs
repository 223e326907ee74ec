//! The layered value store: raw, uninterpolated values keyed by
//! (source layer, setting name).

use std::collections::HashMap;

use crate::value::SettingValue;

/// Identifies one named source of raw setting values.
///
/// `Section` covers both per-environment values and run-mode values:
/// each is a named section of a parsed configuration file, and the
/// search path decides which section names are consulted for a lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LayerKey {
    /// Command line overrides; persists until explicitly cleared
    Cli,
    /// In-memory overrides; persists until explicitly cleared
    Memory,
    /// A named config-file section (an environment or a run mode)
    Section(String),
    /// The main config-file section
    Main,
    /// Application-supplied defaults, written exactly once
    AppDefaults,
}

impl LayerKey {
    /// Returns the layer's display name.
    pub fn name(&self) -> &str {
        match self {
            LayerKey::Cli => "cli",
            LayerKey::Memory => "memory",
            LayerKey::Section(name) => name,
            LayerKey::Main => "main",
            LayerKey::AppDefaults => "application_defaults",
        }
    }

    /// True for the layers a successful parse wholesale-replaces.
    pub fn is_file_sourced(&self) -> bool {
        !matches!(self, LayerKey::Cli | LayerKey::AppDefaults)
    }
}

/// Raw values from every source, before interpolation.
///
/// Values are stored exactly as supplied; `Boolean(false)` is an
/// explicit entry and resolution treats it as such.
#[derive(Debug, Default)]
pub struct LayeredValueStore {
    layers: HashMap<LayerKey, HashMap<String, SettingValue>>,
}

impl LayeredValueStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `value` for `name` in `layer`.
    pub fn set(&mut self, layer: LayerKey, name: impl Into<String>, value: SettingValue) {
        self.layers
            .entry(layer)
            .or_default()
            .insert(name.into(), value);
    }

    /// Looks up the raw value for `name` in exactly one layer.
    pub fn get(&self, layer: &LayerKey, name: &str) -> Option<&SettingValue> {
        self.layers.get(layer).and_then(|values| values.get(name))
    }

    /// True when `layer` holds an explicit entry for `name`.
    pub fn contains(&self, layer: &LayerKey, name: &str) -> bool {
        self.get(layer, name).is_some()
    }

    /// Removes every value in one layer.
    pub fn clear_layer(&mut self, layer: &LayerKey) {
        self.layers.remove(layer);
    }

    /// Removes every file-sourced layer (everything except `cli` and
    /// `application_defaults`), ahead of repopulation from a parse.
    pub fn clear_file_sourced(&mut self) {
        self.layers.retain(|key, _| !key.is_file_sourced());
    }

    /// True when `layer` holds at least one value.
    pub fn has_layer(&self, layer: &LayerKey) -> bool {
        self.layers
            .get(layer)
            .map(|values| !values.is_empty())
            .unwrap_or(false)
    }

    /// The names with explicit entries in `layer`, unordered.
    pub fn names_in(&self, layer: &LayerKey) -> Vec<String> {
        self.layers
            .get(layer)
            .map(|values| values.keys().cloned().collect())
            .unwrap_or_default()
    }
}
