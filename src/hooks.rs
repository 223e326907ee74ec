//! Change hooks attached to individual settings.
//!
//! A hook is a callback that observes a setting's fully resolved value.
//! The engine fires it once at definition time (when the setting is
//! flagged for it) and again whenever a parse establishes a new
//! effective value for the setting.

use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::value::SettingValue;

/// A shared callback observing one setting's resolved value.
///
/// Hooks are cheap to clone and safe to fire from any thread holding a
/// reference to the engine.
#[derive(Clone)]
pub struct SettingHook {
    callback: Arc<dyn Fn(&SettingValue) + Send + Sync>,
}

impl SettingHook {
    /// Wraps a callback into a hook.
    ///
    /// # Example
    /// ```
    /// use stratix::hooks::SettingHook;
    /// use stratix::value::SettingValue;
    ///
    /// let hook = SettingHook::new(|value: &SettingValue| {
    ///     println!("confdir is now {}", value.coerce_to_string());
    /// });
    /// hook.invoke("confdir", &SettingValue::from("/etc/app"));
    /// ```
    pub fn new(callback: impl Fn(&SettingValue) + Send + Sync + 'static) -> Self {
        Self {
            callback: Arc::new(callback),
        }
    }

    /// Fires the hook with a resolved value.
    pub fn invoke(&self, name: &str, value: &SettingValue) {
        trace!(setting = name, value = %value.coerce_to_string(), "dispatching setting hook");
        (self.callback)(value);
    }
}

impl fmt::Debug for SettingHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SettingHook")
    }
}
