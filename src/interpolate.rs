//! Textual interpolation of `$name` / `${name}` references.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{SettingsError, SettingsResult};

static TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{(\w+)\}|\$(\w+)").expect("interpolation token pattern"));

/// Expands every `$name` and `${name}` token in `value`.
///
/// The literal token `environment` resolves to the environment context
/// when one is given; every other token is resolved through `lookup`,
/// which is expected to run the full resolution algorithm (so a
/// referenced setting is itself interpolated before substitution). A
/// token `lookup` cannot resolve fails the whole expansion with an
/// error naming the reference and the original string.
///
/// This is a single left-to-right pass with no cycle detection: a value
/// that (directly or transitively) references itself recurses through
/// `lookup` until the call stack is exhausted. Known limitation.
pub fn interpolate<F>(
    value: &str,
    environment: Option<&str>,
    mut lookup: F,
) -> SettingsResult<String>
where
    F: FnMut(&str) -> SettingsResult<Option<String>>,
{
    if !value.contains('$') {
        return Ok(value.to_string());
    }

    let mut expanded = String::with_capacity(value.len());
    let mut last_end = 0;

    for caps in TOKEN.captures_iter(value) {
        let Some(whole) = caps.get(0) else { continue };
        let Some(name) = caps.get(1).or_else(|| caps.get(2)) else {
            continue;
        };
        expanded.push_str(&value[last_end..whole.start()]);

        let substitution = match (name.as_str(), environment) {
            ("environment", Some(environment)) => environment.to_string(),
            (reference, _) => lookup(reference)?
                .ok_or_else(|| SettingsError::interpolation(reference, value))?,
        };
        expanded.push_str(&substitution);
        last_end = whole.end();
    }

    expanded.push_str(&value[last_end..]);
    Ok(expanded)
}
