//! The settings engine: registry, resolution, parsing, and clearing.
//!
//! `Settings` owns the definition registry and the guarded mutable
//! state (layered store, resolution cache, used-section bookkeeping,
//! run mode). Definitions are registered once at startup through
//! [`Settings::define_settings`]; everything after that goes through
//! the layered store and is resolved on demand.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::cache::ResolutionCache;
use crate::definition::{FileMetadata, SettingAttrs, SettingDefinition, SettingType};
use crate::error::{SettingsError, SettingsResult};
use crate::interpolate::interpolate;
use crate::parser::{self, ParsedConfigFile, MAIN_SECTION};
use crate::search::{search_path, RunMode};
use crate::store::{LayerKey, LayeredValueStore};
use crate::value::SettingValue;

/// Settings that may only be written through the application-defaults
/// layer.
pub const READ_ONLY_SETTINGS: &[&str] = &["name", "run_mode"];

/// Application defaults that must be supplied at initialization.
pub const REQUIRED_APP_SETTINGS: &[&str] = &["name", "run_mode"];

/// Mutable state shared between threads, guarded by one mutex.
///
/// This is deliberately a single exclusive critical section for readers
/// and writers alike. Each access takes the lock briefly; a resolution
/// that recurses through interpolation re-acquires it between accesses,
/// so another thread's mutation can be observed mid-resolution. That
/// narrow race is accepted; mutations compensate by invalidating the
/// whole cache.
#[derive(Default)]
struct Inner {
    store: LayeredValueStore,
    cache: ResolutionCache,
    used_sections: HashSet<String>,
    metadata_overrides: HashMap<String, FileMetadata>,
    run_mode: RunMode,
    app_defaults_initialized: bool,
}

/// The layered, self-interpolating settings engine.
///
/// # Example
/// ```
/// use stratix::{Settings, SettingAttrs, SettingType};
///
/// let mut settings = Settings::new();
/// settings
///     .define_settings(
///         "main",
///         vec![
///             ("confdir", SettingAttrs::new("Config dir.").default("/etc/app")),
///             (
///                 "ssldir",
///                 SettingAttrs::new("SSL dir.")
///                     .kind(SettingType::Directory)
///                     .default("$confdir/ssl"),
///             ),
///         ],
///     )
///     .unwrap();
///
/// let ssldir = settings.value("ssldir", None).unwrap().unwrap();
/// assert_eq!(ssldir.coerce_to_string(), "/etc/app/ssl");
/// ```
pub struct Settings {
    definitions: HashMap<String, SettingDefinition>,
    shorts: HashMap<char, String>,
    explicit_config_files: Vec<PathBuf>,
    mutation_listener: Option<Box<dyn Fn() + Send + Sync>>,
    inner: Mutex<Inner>,
}

impl Settings {
    /// Creates an empty engine with no definitions.
    pub fn new() -> Self {
        Self {
            definitions: HashMap::new(),
            shorts: HashMap::new(),
            explicit_config_files: Vec::new(),
            mutation_listener: None,
            inner: Mutex::new(Inner::default()),
        }
    }

    // ------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------

    /// Registers a batch of settings under one section.
    ///
    /// Registration is two-phase: every entry in the batch is validated
    /// and registered first, and only then are `call_on_define` hooks
    /// fired — each with its setting's fully resolved value, so a hook
    /// never observes a partially registered batch.
    ///
    /// # Errors
    /// Authoring errors for a malformed attribute bag, a duplicate
    /// setting name, or a duplicate short flag.
    pub fn define_settings(
        &mut self,
        section: &str,
        entries: Vec<(&str, SettingAttrs)>,
    ) -> SettingsResult<()> {
        let mut registered = Vec::with_capacity(entries.len());

        for (name, attrs) in entries {
            let definition = SettingDefinition::from_attrs(name, section, attrs)?;
            if self.definitions.contains_key(name) {
                return Err(SettingsError::authoring(format!(
                    "setting {name} is already defined"
                )));
            }
            if let Some(short) = definition.short() {
                if let Some(taken) = self.shorts.get(&short) {
                    return Err(SettingsError::authoring(format!(
                        "short flag -{short} for {name} is already taken by {taken}"
                    )));
                }
                self.shorts.insert(short, name.to_string());
            }
            self.definitions.insert(name.to_string(), definition);
            registered.push(name.to_string());
        }

        for name in registered {
            let definition = &self.definitions[&name];
            if !definition.call_on_define() {
                continue;
            }
            if let Some(hook) = definition.hook() {
                if let Some(value) = self.value(&name, None)? {
                    hook.invoke(&name, &value);
                }
            }
        }

        Ok(())
    }

    /// Looks up one setting's definition.
    pub fn definition(&self, name: &str) -> Option<&SettingDefinition> {
        self.definitions.get(name)
    }

    /// Resolves a single-letter alias to its setting name.
    pub fn setting_for_short(&self, short: char) -> Option<&str> {
        self.shorts.get(&short).map(String::as_str)
    }

    /// All setting names, sorted.
    pub fn setting_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.definitions.keys().cloned().collect();
        names.sort();
        names
    }

    /// All distinct sections with at least one setting.
    pub fn sections(&self) -> Vec<String> {
        let mut sections: HashSet<String> = self
            .definitions
            .values()
            .map(|d| d.section().to_string())
            .collect();
        let mut sections: Vec<String> = sections.drain().collect();
        sections.sort();
        sections
    }

    /// True when `name` may only be written through application
    /// defaults.
    pub fn is_read_only(&self, name: &str) -> bool {
        READ_ONLY_SETTINGS.contains(&name)
    }

    // ------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------

    /// Resolves the effective, interpolated value of a setting.
    ///
    /// Unknown names resolve to `Ok(None)` rather than an error. The
    /// per-environment cache is consulted first; on a miss the layers
    /// of the search path are walked in order and the first explicit
    /// entry wins (including an explicit `false`), falling back to the
    /// definition's default template. String values are interpolated
    /// unless the definition is marked literal, and the result is
    /// memoized for the environment.
    pub fn value(
        &self,
        name: &str,
        environment: Option<&str>,
    ) -> SettingsResult<Option<SettingValue>> {
        let Some(definition) = self.definitions.get(name) else {
            return Ok(None);
        };

        {
            let inner = self.inner.lock();
            if let Some(cached) = inner.cache.get(environment, name) {
                return Ok(Some(cached.clone()));
            }
        }

        let Some(raw) = self.uninterpolated_value(name, environment) else {
            return Ok(None);
        };

        let resolved = match raw {
            SettingValue::String(text) if !definition.is_literal() => SettingValue::String(
                interpolate(&text, environment, |reference| {
                    Ok(self
                        .value(reference, environment)?
                        .map(|v| v.coerce_to_string()))
                })?,
            ),
            other => other,
        };
        // Default templates arrive as strings; munge so a boolean
        // setting's "false" default resolves as a real boolean.
        let resolved = definition.kind().munge(name, resolved)?;

        let mut inner = self.inner.lock();
        inner.cache.insert(environment, name, resolved.clone());
        Ok(Some(resolved))
    }

    /// Resolves a setting's raw value without interpolation.
    ///
    /// Walks the search path and falls back to the default template
    /// exactly like [`Settings::value`], but never expands `$name`
    /// references and never touches the cache.
    pub fn uninterpolated_value(
        &self,
        name: &str,
        environment: Option<&str>,
    ) -> Option<SettingValue> {
        let definition = self.definitions.get(name)?;

        let inner = self.inner.lock();
        for layer in search_path(environment, inner.run_mode) {
            if let Some(value) = inner.store.get(&layer, name) {
                return Some(value.clone());
            }
        }
        drop(inner);

        definition
            .default()
            .map(|template| SettingValue::String(template.to_string()))
    }

    /// Resolves a setting and coerces it to a string.
    pub fn string_value(&self, name: &str, environment: Option<&str>) -> SettingsResult<Option<String>> {
        Ok(self.value(name, environment)?.map(|v| v.coerce_to_string()))
    }

    /// Resolves a setting expected to be a boolean.
    pub fn bool_value(&self, name: &str, environment: Option<&str>) -> SettingsResult<Option<bool>> {
        match self.value(name, environment)? {
            Some(value) => value
                .as_bool()
                .map(Some)
                .ok_or_else(|| {
                    SettingsError::invalid_value(
                        name,
                        format!("expected a boolean, got {}", value.type_name()),
                    )
                }),
            None => Ok(None),
        }
    }

    /// The current run mode.
    pub fn run_mode(&self) -> RunMode {
        self.inner.lock().run_mode
    }

    /// The environment settings resolve under when none is given
    /// explicitly: the value of the `environment` setting, when the
    /// embedding application defined one.
    pub fn active_environment(&self) -> Option<String> {
        if !self.definitions.contains_key("environment") {
            return None;
        }
        self.string_value("environment", None)
            .ok()
            .flatten()
            .filter(|env| !env.is_empty())
    }

    /// The effective file metadata for a file/directory setting:
    /// parse-time annotations merged over the definition's baseline.
    pub fn file_metadata(&self, name: &str) -> Option<FileMetadata> {
        let definition = self.definitions.get(name)?;
        if !definition.is_file_kind() {
            return None;
        }
        let inner = self.inner.lock();
        Some(match inner.metadata_overrides.get(name) {
            Some(overrides) => overrides.merged_over(definition.file_metadata()),
            None => definition.file_metadata().clone(),
        })
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Registers the callback fired after every mutating write.
    ///
    /// External caches keyed on resolved settings (such as a module
    /// search path) hang off this to invalidate themselves.
    pub fn on_mutation(&mut self, listener: impl Fn() + Send + Sync + 'static) {
        self.mutation_listener = Some(Box::new(listener));
    }

    fn notify_mutation(&self) {
        if let Some(listener) = &self.mutation_listener {
            listener();
        }
    }

    /// Writes an in-memory override (the `memory` layer).
    pub fn set(&self, name: &str, value: impl Into<SettingValue>) -> SettingsResult<()> {
        self.set_value(name, value.into(), LayerKey::Memory)
    }

    /// Writes a value into one layer, munging it to the setting's type.
    ///
    /// # Errors
    /// Unknown setting names are rejected (unlike file parsing, which
    /// skips them); read-only settings only accept writes through the
    /// application-defaults layer.
    pub fn set_value(
        &self,
        name: &str,
        value: SettingValue,
        layer: LayerKey,
    ) -> SettingsResult<()> {
        let Some(definition) = self.definitions.get(name) else {
            return Err(SettingsError::unknown_setting(name));
        };
        if self.is_read_only(name) && layer != LayerKey::AppDefaults {
            return Err(SettingsError::read_only(name));
        }
        let munged = definition.kind().munge(name, value)?;

        {
            let mut inner = self.inner.lock();
            inner.store.set(layer, name, munged);
            inner.cache.clear();
        }
        self.notify_mutation();
        Ok(())
    }

    /// Applies one parsed command line option to the `cli` layer.
    ///
    /// `opt` is a long name (leading dashes tolerated), a registered
    /// short alias, or a GNU-style `no-` negation of a boolean setting.
    /// Boolean settings accept a missing value as `true`.
    pub fn handle_arg(&self, opt: &str, value: Option<&str>) -> SettingsResult<()> {
        let mut name = opt.trim_start_matches('-');

        let mut negated = false;
        if let Some(stripped) = name.strip_prefix("no-") {
            if self
                .definitions
                .get(stripped)
                .map(|d| d.kind() == SettingType::Boolean)
                .unwrap_or(false)
            {
                name = stripped;
                negated = true;
            }
        }

        let resolved_short;
        if name.len() == 1 && !self.definitions.contains_key(name) {
            let Some(short) = name.chars().next() else {
                return Err(SettingsError::unknown_setting(opt));
            };
            match self.setting_for_short(short) {
                Some(long) => {
                    resolved_short = long.to_string();
                    name = &resolved_short;
                }
                None => return Err(SettingsError::unknown_setting(opt)),
            }
        }

        let Some(definition) = self.definitions.get(name) else {
            return Err(SettingsError::unknown_setting(name));
        };

        let value = match (definition.kind(), value) {
            (SettingType::Boolean, None) | (SettingType::Boolean, Some("")) => {
                SettingValue::Boolean(!negated)
            }
            (SettingType::Boolean, Some(text)) => SettingValue::guess(text),
            (_, Some(text)) => SettingValue::String(text.to_string()),
            (_, None) => {
                return Err(SettingsError::invalid_value(
                    name,
                    "option requires a value",
                ))
            }
        };

        self.set_value(name, value, LayerKey::Cli)
    }

    /// Clears all command line overrides.
    ///
    /// Also resets the used-section bookkeeping: CLI overrides can
    /// change which paths must be realized, so sections become eligible
    /// for realization again.
    pub fn clear_cli(&self) {
        {
            let mut inner = self.inner.lock();
            inner.store.clear_layer(&LayerKey::Cli);
            inner.used_sections.clear();
            inner.cache.clear();
        }
        self.notify_mutation();
    }

    /// Clears all in-memory overrides.
    pub fn clear_memory(&self) {
        {
            let mut inner = self.inner.lock();
            inner.store.clear_layer(&LayerKey::Memory);
            inner.cache.clear();
        }
        self.notify_mutation();
    }

    /// Installs the application-supplied defaults, exactly once.
    ///
    /// This is the only path that may write the read-only settings.
    /// The `run_mode` default also fixes the process run mode.
    ///
    /// # Errors
    /// Authoring errors for a second initialization, a missing required
    /// key, an unknown setting name, or an invalid run-mode value.
    pub fn initialize_app_defaults(
        &self,
        defaults: HashMap<String, SettingValue>,
    ) -> SettingsResult<()> {
        for required in REQUIRED_APP_SETTINGS {
            if !defaults.contains_key(*required) {
                return Err(SettingsError::authoring(format!(
                    "application default {required} is required"
                )));
            }
        }

        let mut munged = Vec::with_capacity(defaults.len());
        let mut run_mode = RunMode::default();
        for (name, value) in defaults {
            let Some(definition) = self.definitions.get(&name) else {
                return Err(SettingsError::authoring(format!(
                    "application default {name} is not a defined setting"
                )));
            };
            let value = definition.kind().munge(&name, value)?;
            if name == "run_mode" {
                run_mode = value.coerce_to_string().parse()?;
            }
            munged.push((name, value));
        }

        {
            let mut inner = self.inner.lock();
            if inner.app_defaults_initialized {
                return Err(SettingsError::authoring(
                    "application defaults are already initialized",
                ));
            }
            for (name, value) in munged {
                inner.store.set(LayerKey::AppDefaults, name, value);
            }
            inner.run_mode = run_mode;
            inner.app_defaults_initialized = true;
            inner.cache.clear();
        }
        self.notify_mutation();
        Ok(())
    }

    /// True once application defaults have been installed.
    pub fn app_defaults_initialized(&self) -> bool {
        self.inner.lock().app_defaults_initialized
    }

    pub(crate) fn filter_unused_sections(&self, sections: &[&str]) -> Vec<String> {
        let inner = self.inner.lock();
        let mut fresh = Vec::new();
        for section in sections {
            if !inner.used_sections.contains(*section)
                && !fresh.iter().any(|f: &String| f.as_str() == *section)
            {
                fresh.push((*section).to_string());
            }
        }
        fresh
    }

    pub(crate) fn mark_sections_used(&self, sections: &[String]) {
        let mut inner = self.inner.lock();
        for section in sections {
            inner.used_sections.insert(section.clone());
        }
    }

    // ------------------------------------------------------------------
    // Parsing
    // ------------------------------------------------------------------

    /// Pins the candidate configuration file list for [`Settings::parse`].
    pub fn set_config_files(&mut self, files: Vec<PathBuf>) {
        self.explicit_config_files = files;
    }

    /// The candidate configuration files, in merge order.
    ///
    /// An explicit list wins; otherwise a defined `config` setting
    /// names the single main file; otherwise the system-wide file under
    /// `/etc` is merged with the user-specific one from the platform
    /// config directory.
    pub fn config_files(&self) -> Vec<PathBuf> {
        if !self.explicit_config_files.is_empty() {
            return self.explicit_config_files.clone();
        }
        if self.definitions.contains_key("config") {
            if let Ok(Some(path)) = self.string_value("config", None) {
                return vec![PathBuf::from(path)];
            }
        }

        let app = self
            .string_value("name", None)
            .ok()
            .flatten()
            .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string());
        let mut files = vec![PathBuf::from(format!("/etc/{app}/{app}.conf"))];
        if let Some(config_dir) = dirs::config_dir() {
            files.push(config_dir.join(&app).join(format!("{app}.conf")));
        }
        files
    }

    /// Parses the candidate configuration files and replaces every
    /// file-sourced layer.
    pub fn parse(&self) -> SettingsResult<()> {
        let files = self.config_files();
        self.parse_files(&files)
    }

    /// Parses an ordered list of candidate files.
    ///
    /// Non-existent files are skipped silently. Later files merge over
    /// earlier ones key-by-key within each section. If nothing
    /// contributed any data the call is a no-op. Any parse failure
    /// aborts the whole call with the store untouched; only a fully
    /// parsed batch replaces the file-sourced layers. After population,
    /// hooks fire for every hooked setting a layer defines, and inline
    /// file metadata is re-applied so higher-precedence sections win.
    pub fn parse_files(&self, files: &[PathBuf]) -> SettingsResult<()> {
        let mut aggregate = ParsedConfigFile::default();
        for file in files {
            if !file.exists() {
                debug!(file = %file.display(), "skipping missing config file");
                continue;
            }
            aggregate.merge_from(parser::parse_file(file)?);
        }

        if aggregate.is_empty() {
            debug!("no configuration data found; leaving store untouched");
            return Ok(());
        }

        {
            let mut inner = self.inner.lock();
            inner.store.clear_file_sourced();
            inner.metadata_overrides.clear();

            for (section, values) in &aggregate.sections {
                let layer = Self::layer_for_section(section);
                for (name, value) in values {
                    if self.definitions.contains_key(name) {
                        inner.store.set(layer.clone(), name.as_str(), value.clone());
                    } else {
                        // Files may carry settings for other tools or
                        // newer versions; they are skipped, not fatal.
                        debug!(setting = %name, section = %section, "ignoring unknown setting");
                    }
                }
            }
            inner.cache.clear();
        }

        let environment = self.active_environment();
        self.dispatch_parse_hooks(environment.as_deref())?;
        self.apply_parsed_metadata(&aggregate, environment.as_deref());

        self.notify_mutation();
        Ok(())
    }

    fn layer_for_section(section: &str) -> LayerKey {
        if section == MAIN_SECTION {
            LayerKey::Main
        } else {
            LayerKey::Section(section.to_string())
        }
    }

    /// Fires hooks for every hooked setting that some layer defines,
    /// passing the fully resolved value for the active environment.
    fn dispatch_parse_hooks(&self, environment: Option<&str>) -> SettingsResult<()> {
        for name in self.setting_names() {
            let definition = &self.definitions[&name];
            let Some(hook) = definition.hook() else {
                continue;
            };

            let defined_in_some_layer = {
                let inner = self.inner.lock();
                search_path(environment, inner.run_mode)
                    .iter()
                    .any(|layer| inner.store.contains(layer, &name))
            };
            if !defined_in_some_layer {
                continue;
            }

            if let Some(value) = self.value(&name, environment)? {
                hook.invoke(&name, &value);
            }
        }
        Ok(())
    }

    /// Re-applies inline `{owner=..., group=..., mode=...}` annotations
    /// in reverse search-path order, so metadata from a
    /// higher-precedence section overrides lower ones field by field.
    fn apply_parsed_metadata(&self, aggregate: &ParsedConfigFile, environment: Option<&str>) {
        let mut inner = self.inner.lock();
        let mut path = search_path(environment, inner.run_mode);
        path.reverse();

        for layer in path {
            let section = match &layer {
                LayerKey::Main => MAIN_SECTION,
                LayerKey::Section(name) => name.as_str(),
                _ => continue,
            };
            let Some(entries) = aggregate.metadata.get(section) else {
                continue;
            };
            for (name, metadata) in entries {
                let known_file_setting = self
                    .definitions
                    .get(name)
                    .map(|d| d.is_file_kind())
                    .unwrap_or(false);
                if !known_file_setting {
                    warn!(setting = %name, section = %section, "ignoring file metadata for non-file setting");
                    continue;
                }
                let merged = match inner.metadata_overrides.get(name) {
                    Some(existing) => metadata.merged_over(existing),
                    None => metadata.clone(),
                };
                inner.metadata_overrides.insert(name.clone(), merged);
            }
        }
    }

    // ------------------------------------------------------------------
    // Generated output
    // ------------------------------------------------------------------

    /// Renders a configuration file reflecting the current effective
    /// values of every non-read-only setting, under a section header
    /// matching the active run mode. Parsing the result back yields the
    /// same effective values.
    pub fn to_config_string(&self, environment: Option<&str>) -> SettingsResult<String> {
        let mut out = String::new();
        out.push_str("# Generated settings file.\n");
        out.push_str("# Each entry shows the value currently in effect for this run\n");
        out.push_str("# mode; values changed here override the built-in defaults.\n\n");
        out.push_str(&format!("[{}]\n", self.run_mode()));

        for name in self.setting_names() {
            if self.is_read_only(&name) {
                continue;
            }
            let definition = &self.definitions[&name];
            out.push('\n');
            for line in definition.desc().lines() {
                out.push_str(&format!("# {line}\n"));
            }
            let value = self
                .value(&name, environment)?
                .map(|v| v.coerce_to_string())
                .unwrap_or_default();
            out.push_str(&format!("{name} = {value}\n"));
        }
        Ok(out)
    }

    /// Lists every setting with its effective value, sorted by name.
    pub fn list(&self, environment: Option<&str>) -> SettingsResult<Vec<(String, String)>> {
        let mut listing = Vec::with_capacity(self.definitions.len());
        for name in self.setting_names() {
            let value = self
                .value(&name, environment)?
                .map(|v| v.coerce_to_string())
                .unwrap_or_default();
            listing.push((name, value));
        }
        Ok(listing)
    }

    /// Renders the `name = value` listing used by the print surface.
    pub fn to_listing_string(&self, environment: Option<&str>) -> SettingsResult<String> {
        let mut out = String::new();
        for (name, value) in self.list(environment)? {
            out.push_str(&format!("{name} = {value}\n"));
        }
        Ok(out)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}
