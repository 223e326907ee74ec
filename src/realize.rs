//! Realization of file and directory settings as on-disk state.
//!
//! The engine never touches the live system itself: it derives
//! provisioning intents from file/directory-typed settings and hands
//! them to a [`ResourceApplier`] collaborator, which reports per-intent
//! success or failure.

use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;

use serde::Serialize;
use tracing::debug;

use crate::error::{SettingsError, SettingsResult};
use crate::settings::Settings;

/// What kind of filesystem object an intent provisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// A regular file
    File,
    /// A directory
    Directory,
}

/// One file or directory to ensure on disk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceIntent {
    /// File or directory
    pub kind: ResourceKind,
    /// Resolved path
    pub path: PathBuf,
    /// Owning user, if pinned
    pub owner: Option<String>,
    /// Owning group, if pinned
    pub group: Option<String>,
    /// Octal permission string, if pinned
    pub mode: Option<String>,
}

/// The full set of intents for a realization pass, plus the user and
/// group names that must exist when service-user creation is on.
#[derive(Debug, Default, Serialize)]
pub struct ProvisioningPlan {
    /// Deduplicated intents, ordered by path
    pub resources: Vec<ResourceIntent>,
    /// User names referenced by intents
    pub users: BTreeSet<String>,
    /// Group names referenced by intents
    pub groups: BTreeSet<String>,
}

impl ProvisioningPlan {
    /// True when the plan provisions nothing.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Renders the plan as a manifest-style JSON document.
    pub fn to_manifest_json(&self) -> SettingsResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| SettingsError::invalid_value("provisioning plan", e.to_string()))
    }
}

/// Applies provisioning intents to the live system.
///
/// Implementations create/ensure each file or directory with the
/// requested ownership and permissions and report one result per
/// intent, in order.
pub trait ResourceApplier {
    /// Ensures every intent, returning per-intent outcomes.
    fn apply(&self, intents: &[ResourceIntent]) -> Vec<Result<(), String>>;
}

impl Settings {
    /// Derives the provisioning plan for a set of sections.
    ///
    /// One intent is produced per file/directory setting whose section
    /// is requested and whose value resolves to a non-empty path;
    /// intents are deduplicated by path (the first setting, in name
    /// order, wins). With `create_users` set, every referenced owner
    /// and group except `root` lands in the plan's principal sets.
    pub fn provisioning_plan(
        &self,
        sections: &[&str],
        environment: Option<&str>,
        create_users: bool,
    ) -> SettingsResult<ProvisioningPlan> {
        let mut plan = ProvisioningPlan::default();
        let mut seen_paths: HashSet<PathBuf> = HashSet::new();

        for name in self.setting_names() {
            let Some(definition) = self.definition(&name) else {
                continue;
            };
            if !definition.is_file_kind() || !sections.contains(&definition.section()) {
                continue;
            }
            let Some(value) = self.value(&name, environment)? else {
                continue;
            };
            let path_text = value.coerce_to_string();
            if path_text.is_empty() {
                continue;
            }
            let path = PathBuf::from(path_text);
            if !seen_paths.insert(path.clone()) {
                continue;
            }

            let metadata = self.file_metadata(&name).unwrap_or_default();
            if create_users {
                if let Some(owner) = metadata.owner.as_deref().filter(|o| *o != "root") {
                    plan.users.insert(owner.to_string());
                }
                if let Some(group) = metadata.group.as_deref().filter(|g| *g != "root") {
                    plan.groups.insert(group.to_string());
                }
            }

            plan.resources.push(ResourceIntent {
                kind: match definition.kind() {
                    crate::definition::SettingType::Directory => ResourceKind::Directory,
                    _ => ResourceKind::File,
                },
                path,
                owner: metadata.owner,
                group: metadata.group,
                mode: metadata.mode,
            });
        }

        plan.resources.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(plan)
    }

    /// Realizes the file/directory settings of the given sections.
    ///
    /// Sections already realized in this process are skipped, making
    /// repeated calls idempotent until the cli layer is cleared. All
    /// applier failures are collected and surfaced together; a failed
    /// pass leaves its sections eligible for retry.
    pub fn use_sections(
        &self,
        sections: &[&str],
        environment: Option<&str>,
        create_users: bool,
        applier: &dyn ResourceApplier,
    ) -> SettingsResult<()> {
        let fresh = self.filter_unused_sections(sections);
        if fresh.is_empty() {
            debug!(?sections, "all requested sections already realized");
            return Ok(());
        }
        let fresh_refs: Vec<&str> = fresh.iter().map(String::as_str).collect();

        let plan = self.provisioning_plan(&fresh_refs, environment, create_users)?;
        if plan.is_empty() {
            self.mark_sections_used(&fresh);
            return Ok(());
        }
        debug!(
            sections = ?fresh,
            resources = plan.resources.len(),
            "realizing file and directory settings"
        );

        let outcomes = applier.apply(&plan.resources);
        let failures: Vec<String> = plan
            .resources
            .iter()
            .zip(outcomes)
            .filter_map(|(intent, outcome)| {
                outcome
                    .err()
                    .map(|message| format!("{}: {message}", intent.path.display()))
            })
            .collect();
        if !failures.is_empty() {
            return Err(SettingsError::realization(failures));
        }

        self.mark_sections_used(&fresh);
        Ok(())
    }

    /// Realizes every section with at least one setting.
    pub fn use_all_sections(
        &self,
        environment: Option<&str>,
        create_users: bool,
        applier: &dyn ResourceApplier,
    ) -> SettingsResult<()> {
        let sections = self.sections();
        let section_refs: Vec<&str> = sections.iter().map(String::as_str).collect();
        self.use_sections(&section_refs, environment, create_users, applier)
    }
}
