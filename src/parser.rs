//! The configuration file parser.
//!
//! The on-disk format is a small line grammar:
//!
//! ```text
//! # comment
//! confdir = /etc/app
//!
//! [master]
//! ssldir = $vardir/ssl { owner = app, mode = 771 }
//! ```
//!
//! Files start in the implicit `main` section. A value line may carry a
//! trailing `{owner=..., group=..., mode=...}` annotation, which is
//! stripped from the value and recorded as per-setting file metadata.
//! The section name `application_defaults` is reserved and illegal in a
//! file. Every malformed line is a hard error carrying the file name
//! and line number.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::definition::FileMetadata;
use crate::error::{SettingsError, SettingsResult};
use crate::value::SettingValue;

/// The section name files may never use.
pub const RESERVED_SECTION: &str = "application_defaults";

/// The implicit starting section.
pub const MAIN_SECTION: &str = "main";

static SECTION_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[([^\]]*)\]$").expect("section pattern"));
static SETTING_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^=\s]+)\s*=\s*(.*)$").expect("setting pattern"));
static ANNOTATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*?)\s*\{\s*([^}]*)\s*\}$").expect("annotation pattern"));

/// The section data captured from one or more configuration files.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ParsedConfigFile {
    /// `section -> {key -> value}`
    pub sections: HashMap<String, HashMap<String, SettingValue>>,
    /// `section -> {key -> file metadata}` from inline annotations
    pub metadata: HashMap<String, HashMap<String, FileMetadata>>,
}

impl ParsedConfigFile {
    /// True when no file contributed any data.
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty() && self.metadata.is_empty()
    }

    /// Merges a later file over this one: same-named keys in a section
    /// are overridden key-by-key, sections only present here survive.
    pub fn merge_from(&mut self, later: ParsedConfigFile) {
        for (section, values) in later.sections {
            self.sections.entry(section).or_default().extend(values);
        }
        for (section, entries) in later.metadata {
            self.metadata.entry(section).or_default().extend(entries);
        }
    }
}

/// Parses one configuration file from disk.
///
/// Existence is the caller's concern; a missing file surfaces as
/// [`SettingsError::NotFound`].
pub fn parse_file(path: &Path) -> SettingsResult<ParsedConfigFile> {
    let content = fs::read_to_string(path).map_err(|e| SettingsError::from_open(path, e))?;
    debug!(file = %path.display(), "parsing configuration file");
    parse_string(&path.display().to_string(), &content)
}

/// Parses configuration text, attributing errors to `file`.
pub fn parse_string(file: &str, content: &str) -> SettingsResult<ParsedConfigFile> {
    let mut parsed = ParsedConfigFile::default();
    let mut section = MAIN_SECTION.to_string();

    for (index, raw_line) in content.lines().enumerate() {
        let line_number = index + 1;
        let line = raw_line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(caps) = SECTION_LINE.captures(line) {
            let Some(name) = caps.get(1) else { continue };
            section = parse_section_name(file, line_number, name.as_str())?;
            continue;
        }

        if let Some(caps) = SETTING_LINE.captures(line) {
            let (Some(key), Some(rest)) = (caps.get(1), caps.get(2)) else {
                continue;
            };
            let key = key.as_str().to_string();
            let (value_text, annotation) = split_annotation(rest.as_str());

            if let Some(annotation) = annotation {
                let metadata = parse_annotation(file, line_number, &key, annotation)?;
                parsed
                    .metadata
                    .entry(section.clone())
                    .or_default()
                    .insert(key.clone(), metadata);
            }

            let value_text = strip_quotes(value_text.trim());
            // Modes are octal permission strings and must never be
            // type-guessed into integers.
            let value = if key == "mode" {
                SettingValue::String(value_text.to_string())
            } else {
                SettingValue::guess(value_text)
            };
            parsed
                .sections
                .entry(section.clone())
                .or_default()
                .insert(key, value);
            continue;
        }

        return Err(SettingsError::parse(
            file,
            line_number,
            format!("could not parse line `{line}`"),
        ));
    }

    Ok(parsed)
}

fn parse_section_name(file: &str, line: usize, name: &str) -> SettingsResult<String> {
    let name = name.trim();
    if name == RESERVED_SECTION {
        return Err(SettingsError::parse(
            file,
            line,
            format!("section name `{RESERVED_SECTION}` is reserved"),
        ));
    }
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
        return Err(SettingsError::parse(
            file,
            line,
            format!("invalid section name `{name}`"),
        ));
    }
    Ok(name.to_string())
}

/// Splits a value from its trailing `{...}` annotation, if present.
fn split_annotation(rest: &str) -> (&str, Option<&str>) {
    match ANNOTATION.captures(rest) {
        Some(caps) => match (caps.get(1), caps.get(2)) {
            (Some(value), Some(body)) => (value.as_str(), Some(body.as_str())),
            _ => (rest, None),
        },
        None => (rest, None),
    }
}

fn parse_annotation(
    file: &str,
    line: usize,
    key: &str,
    body: &str,
) -> SettingsResult<FileMetadata> {
    let mut metadata = FileMetadata::default();

    for item in body.split(',') {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        let Some((option, value)) = item.split_once('=') else {
            return Err(SettingsError::parse(
                file,
                line,
                format!("malformed file option `{item}` for {key}"),
            ));
        };
        let option = option.trim();
        let value = strip_quotes(value.trim()).to_string();
        match option {
            "owner" => metadata.owner = Some(value),
            "group" => metadata.group = Some(value),
            "mode" => {
                if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(SettingsError::parse(
                        file,
                        line,
                        format!("invalid mode `{value}` for {key}"),
                    ));
                }
                metadata.mode = Some(value);
            }
            other => {
                return Err(SettingsError::parse(
                    file,
                    line,
                    format!("invalid file option `{other}` for {key}"),
                ));
            }
        }
    }

    Ok(metadata)
}

fn strip_quotes(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> ParsedConfigFile {
        parse_string("test.conf", content).expect("content should parse")
    }

    #[test]
    fn test_implicit_main_section() {
        let parsed = parse("confdir = /etc/app\n");
        assert_eq!(
            parsed.sections["main"]["confdir"],
            SettingValue::String("/etc/app".to_string())
        );
    }

    #[test]
    fn test_sections_and_comments() {
        let parsed = parse(
            "# leading comment\n\
             loglevel = notice\n\
             \n\
             [master]\n\
             # a master-only value\n\
             port = 8140\n",
        );
        assert_eq!(
            parsed.sections["main"]["loglevel"],
            SettingValue::String("notice".to_string())
        );
        assert_eq!(parsed.sections["master"]["port"], SettingValue::Integer(8140));
    }

    #[test]
    fn test_type_guessing() {
        let parsed = parse("a = true\nb = FALSE\nc = 42\nd = hello\n");
        let main = &parsed.sections["main"];
        assert_eq!(main["a"], SettingValue::Boolean(true));
        assert_eq!(main["b"], SettingValue::Boolean(false));
        assert_eq!(main["c"], SettingValue::Integer(42));
        assert_eq!(main["d"], SettingValue::String("hello".to_string()));
    }

    #[test]
    fn test_mode_key_stays_literal() {
        let parsed = parse("mode = 640\n");
        assert_eq!(
            parsed.sections["main"]["mode"],
            SettingValue::String("640".to_string())
        );
    }

    #[test]
    fn test_quoted_values() {
        let parsed = parse("motd = \"hello world\"\nalt = 'single'\n");
        let main = &parsed.sections["main"];
        assert_eq!(main["motd"], SettingValue::String("hello world".to_string()));
        assert_eq!(main["alt"], SettingValue::String("single".to_string()));
    }

    #[test]
    fn test_inline_metadata_annotation() {
        let parsed = parse("ssldir = /var/lib/ssl { owner = app, group = app, mode = 771 }\n");
        assert_eq!(
            parsed.sections["main"]["ssldir"],
            SettingValue::String("/var/lib/ssl".to_string())
        );
        let meta = &parsed.metadata["main"]["ssldir"];
        assert_eq!(meta.owner.as_deref(), Some("app"));
        assert_eq!(meta.group.as_deref(), Some("app"));
        assert_eq!(meta.mode.as_deref(), Some("771"));
    }

    #[test]
    fn test_unknown_file_option_rejected() {
        let error =
            parse_string("test.conf", "ssldir = /ssl { color = red }\n").unwrap_err();
        assert!(error.is_parse());
        assert!(error.to_string().contains("invalid file option"));
    }

    #[test]
    fn test_non_numeric_annotation_mode_rejected() {
        let error =
            parse_string("test.conf", "ssldir = /ssl { mode = rw }\n").unwrap_err();
        assert!(error.is_parse());
        assert!(error.to_string().contains("invalid mode"));
    }

    #[test]
    fn test_reserved_section_rejected() {
        let error =
            parse_string("test.conf", "[application_defaults]\nx = 1\n").unwrap_err();
        match error {
            SettingsError::Parse { line, message, .. } => {
                assert_eq!(line, 1);
                assert!(message.contains("reserved"));
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_line_reports_file_and_line() {
        let error = parse_string("test.conf", "loglevel = notice\nnot a setting\n").unwrap_err();
        match error {
            SettingsError::Parse { file, line, .. } => {
                assert_eq!(file, "test.conf");
                assert_eq!(line, 2);
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_merge_later_file_overrides_key_by_key() {
        let mut first = parse("[master]\nport = 8140\nssldir = /ssl\n");
        let second = parse("[master]\nport = 9999\n[agent]\nnoop = true\n");
        first.merge_from(second);

        // Overridden key takes the later value
        assert_eq!(first.sections["master"]["port"], SettingValue::Integer(9999));
        // Keys absent from the later file survive
        assert_eq!(
            first.sections["master"]["ssldir"],
            SettingValue::String("/ssl".to_string())
        );
        // Sections only in the later file are added
        assert_eq!(first.sections["agent"]["noop"], SettingValue::Boolean(true));
    }

    #[test]
    fn test_empty_content_is_empty() {
        assert!(parse("").is_empty());
        assert!(parse("# only comments\n\n").is_empty());
    }
}
