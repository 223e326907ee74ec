//! Setting definitions: types, attribute bags, and the immutable
//! descriptor the registry stores for each named setting.

use serde::Serialize;

use crate::error::{SettingsError, SettingsResult};
use crate::hooks::SettingHook;
use crate::value::SettingValue;

/// The closed set of setting types.
///
/// Dispatch on this tag happens once, at registration time; nothing in
/// the engine inspects runtime types. `PathList` behaves as a string
/// whose content is several OS paths joined by the platform separator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingType {
    /// Plain string value
    String,
    /// Boolean value
    Boolean,
    /// A file path that can be realized on disk
    File,
    /// A directory path that can be realized on disk
    Directory,
    /// Multiple OS paths joined by the platform separator
    PathList,
}

impl SettingType {
    /// Returns true for the types that can carry file metadata and
    /// produce provisioning intents.
    pub fn is_file_kind(&self) -> bool {
        matches!(self, SettingType::File | SettingType::Directory)
    }

    /// Coerces a raw value into this type's representation.
    ///
    /// Strings reaching a boolean setting must read `true` or `false`;
    /// file and directory paths lose a trailing separator; everything
    /// else passes through unchanged.
    pub fn munge(&self, name: &str, raw: SettingValue) -> SettingsResult<SettingValue> {
        match self {
            SettingType::Boolean => match raw {
                SettingValue::Boolean(_) => Ok(raw),
                SettingValue::String(s) => {
                    if s.eq_ignore_ascii_case("true") {
                        Ok(SettingValue::Boolean(true))
                    } else if s.eq_ignore_ascii_case("false") {
                        Ok(SettingValue::Boolean(false))
                    } else {
                        Err(SettingsError::invalid_value(
                            name,
                            format!("expected true or false, got `{s}`"),
                        ))
                    }
                }
                other => Err(SettingsError::invalid_value(
                    name,
                    format!("expected a boolean, got {}", other.type_name()),
                )),
            },
            SettingType::File | SettingType::Directory => match raw {
                SettingValue::String(s) => {
                    let trimmed = if s.len() > 1 {
                        s.trim_end_matches('/').to_string()
                    } else {
                        s
                    };
                    Ok(SettingValue::String(trimmed))
                }
                other => Err(SettingsError::invalid_value(
                    name,
                    format!("expected a path, got {}", other.type_name()),
                )),
            },
            SettingType::String | SettingType::PathList => Ok(raw),
        }
    }

    /// Human-readable label used in generated output and errors.
    pub fn label(&self) -> &'static str {
        match self {
            SettingType::String => "string",
            SettingType::Boolean => "boolean",
            SettingType::File => "file",
            SettingType::Directory => "directory",
            SettingType::PathList => "path",
        }
    }
}

/// Ownership and permission metadata for file/directory settings.
///
/// A definition carries a baseline; parse-time `{owner=..., group=...,
/// mode=...}` annotations are held separately by the engine and merged
/// over the baseline when a setting is realized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileMetadata {
    /// Owning user name, if pinned
    pub owner: Option<String>,
    /// Owning group name, if pinned
    pub group: Option<String>,
    /// Octal permission string, kept literal (never type-guessed)
    pub mode: Option<String>,
}

impl FileMetadata {
    /// Returns true when no field is set.
    pub fn is_empty(&self) -> bool {
        self.owner.is_none() && self.group.is_none() && self.mode.is_none()
    }

    /// Returns a copy of `self` with any unset field filled from `base`.
    pub fn merged_over(&self, base: &FileMetadata) -> FileMetadata {
        FileMetadata {
            owner: self.owner.clone().or_else(|| base.owner.clone()),
            group: self.group.clone().or_else(|| base.group.clone()),
            mode: self.mode.clone().or_else(|| base.mode.clone()),
        }
    }

    /// Validates the mode field: octal permissions are all-digit strings.
    pub fn validate(&self, name: &str) -> SettingsResult<()> {
        if let Some(mode) = &self.mode {
            if mode.is_empty() || !mode.bytes().all(|b| b.is_ascii_digit()) {
                return Err(SettingsError::invalid_value(
                    name,
                    format!("mode must be an octal digit string, got `{mode}`"),
                ));
            }
        }
        Ok(())
    }
}

/// The attribute bag an embedding application supplies per setting.
///
/// # Example
/// ```
/// use stratix::definition::{SettingAttrs, SettingType};
///
/// let attrs = SettingAttrs::new("The main configuration directory.")
///     .kind(SettingType::Directory)
///     .default("/etc/app")
///     .short('c')
///     .mode("755");
/// ```
#[derive(Debug, Clone, Default)]
pub struct SettingAttrs {
    /// Documentation string (required)
    pub desc: String,
    /// Default template; may reference other settings with `$name`
    pub default: Option<String>,
    /// Setting type; `None` means string
    pub kind: Option<SettingType>,
    /// Single-letter alias, globally unique across all definitions
    pub short: Option<char>,
    /// Owning user (file kinds only)
    pub owner: Option<String>,
    /// Owning group (file kinds only)
    pub group: Option<String>,
    /// Octal permission string (file kinds only)
    pub mode: Option<String>,
    /// Fire the hook once immediately after registration
    pub call_on_define: bool,
    /// Never scan this setting's value for `$` references
    pub literal: bool,
    /// Change hook
    pub hook: Option<SettingHook>,
}

impl SettingAttrs {
    /// Starts an attribute bag with the required documentation string.
    pub fn new(desc: impl Into<String>) -> Self {
        Self {
            desc: desc.into(),
            ..Default::default()
        }
    }

    /// Sets the default value template.
    pub fn default(mut self, template: impl Into<String>) -> Self {
        self.default = Some(template.into());
        self
    }

    /// Sets the setting type.
    pub fn kind(mut self, kind: SettingType) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Sets the single-letter alias.
    pub fn short(mut self, short: char) -> Self {
        self.short = Some(short);
        self
    }

    /// Sets the owning user for file kinds.
    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Sets the owning group for file kinds.
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Sets the octal permission string for file kinds.
    pub fn mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    /// Marks the hook to fire once right after registration.
    pub fn call_on_define(mut self) -> Self {
        self.call_on_define = true;
        self
    }

    /// Marks the value as literal: interpolation never touches it.
    pub fn literal(mut self) -> Self {
        self.literal = true;
        self
    }

    /// Attaches a change hook.
    pub fn hook(mut self, hook: SettingHook) -> Self {
        self.hook = Some(hook);
        self
    }
}

/// Arity of a setting's command line option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionArity {
    /// `--setting` / `--no-setting`, no argument
    Boolean,
    /// `--setting VALUE`
    Valued,
}

/// A parser-agnostic description of one setting's command line option,
/// suitable for both GNU-style and POSIX-style option parsers.
#[derive(Debug, Clone)]
pub struct ArgDescriptor {
    /// Long option name (the setting name)
    pub long: String,
    /// Optional single-letter alias
    pub short: Option<char>,
    /// Whether the option takes a value
    pub arity: OptionArity,
    /// Help text (the setting's documentation string)
    pub help: String,
}

/// Immutable descriptor of one named setting.
#[derive(Debug, Clone)]
pub struct SettingDefinition {
    name: String,
    section: String,
    desc: String,
    kind: SettingType,
    default: Option<String>,
    short: Option<char>,
    literal: bool,
    call_on_define: bool,
    hook: Option<SettingHook>,
    file_metadata: FileMetadata,
}

impl SettingDefinition {
    /// Validates an attribute bag and builds the definition.
    ///
    /// # Errors
    /// Authoring errors for an empty name or description, a non-token
    /// name, file metadata on a non-file type, or a malformed mode.
    pub fn from_attrs(
        name: impl Into<String>,
        section: impl Into<String>,
        attrs: SettingAttrs,
    ) -> SettingsResult<Self> {
        let name = name.into();
        let section = section.into();

        if name.is_empty()
            || !name
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_')
        {
            return Err(SettingsError::authoring(format!(
                "setting name `{name}` is not a valid token"
            )));
        }
        if attrs.desc.is_empty() {
            return Err(SettingsError::authoring(format!(
                "setting {name} has no description"
            )));
        }

        let kind = attrs.kind.unwrap_or(SettingType::String);
        let file_metadata = FileMetadata {
            owner: attrs.owner,
            group: attrs.group,
            mode: attrs.mode,
        };
        if !kind.is_file_kind() && !file_metadata.is_empty() {
            return Err(SettingsError::authoring(format!(
                "setting {name} is a {} and cannot carry owner/group/mode",
                kind.label()
            )));
        }
        file_metadata
            .validate(&name)
            .map_err(|e| SettingsError::authoring(e.to_string()))?;

        if attrs.call_on_define && attrs.hook.is_none() {
            return Err(SettingsError::authoring(format!(
                "setting {name} requests call_on_define but has no hook"
            )));
        }

        Ok(Self {
            name,
            section,
            desc: attrs.desc,
            kind,
            default: attrs.default,
            short: attrs.short,
            literal: attrs.literal,
            call_on_define: attrs.call_on_define,
            hook: attrs.hook,
            file_metadata,
        })
    }

    /// The setting's unique name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The section this setting belongs to.
    pub fn section(&self) -> &str {
        &self.section
    }

    /// The documentation string.
    pub fn desc(&self) -> &str {
        &self.desc
    }

    /// The setting's type.
    pub fn kind(&self) -> SettingType {
        self.kind
    }

    /// The default value template, if any.
    pub fn default(&self) -> Option<&str> {
        self.default.as_deref()
    }

    /// The single-letter alias, if any.
    pub fn short(&self) -> Option<char> {
        self.short
    }

    /// True when interpolation must never touch this setting's value.
    pub fn is_literal(&self) -> bool {
        self.literal
    }

    /// True when the hook fires once right after registration.
    pub fn call_on_define(&self) -> bool {
        self.call_on_define
    }

    /// The change hook, if any.
    pub fn hook(&self) -> Option<&SettingHook> {
        self.hook.as_ref()
    }

    /// True if a change hook is attached.
    pub fn has_hook(&self) -> bool {
        self.hook.is_some()
    }

    /// Baseline ownership/permission metadata from the definition.
    pub fn file_metadata(&self) -> &FileMetadata {
        &self.file_metadata
    }

    /// True for file and directory settings.
    pub fn is_file_kind(&self) -> bool {
        self.kind.is_file_kind()
    }

    /// The command line option this setting exposes.
    pub fn arg_descriptor(&self) -> ArgDescriptor {
        ArgDescriptor {
            long: self.name.clone(),
            short: self.short,
            arity: if self.kind == SettingType::Boolean {
                OptionArity::Boolean
            } else {
                OptionArity::Valued
            },
            help: self.desc.clone(),
        }
    }
}
