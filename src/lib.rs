//! # stratix
//!
//! A layered, self-interpolating settings engine for Rust applications.
//!
//! stratix merges settings supplied from multiple sources into a single
//! deterministic value per setting name, expands `$name` references
//! between settings, and can realize file/directory settings on disk
//! through a pluggable applier.
//!
//! ## Architecture Overview
//!
//! Every setting is resolved by walking an ordered search path of value
//! layers. The precedence order (highest to lowest) is:
//!
//! 1. **Command line** - values bound from parsed options
//! 2. **Memory** - in-process overrides set via `set()`
//! 3. **Environment section** - the `[<environment>]` config section, when
//!    an environment is given
//! 4. **Run-mode section** - the `[master]`/`[agent]`/`[user]` config
//!    section matching the current run mode
//! 5. **Main section** - the `[main]` config section
//! 6. **Application defaults** - installed once at startup
//!
//! A setting absent from every layer falls back to its definition's
//! default template, which may itself reference other settings.
//!
//! ## Quick Start
//!
//! ```rust
//! use stratix::{Settings, SettingAttrs, SettingType};
//!
//! let mut settings = Settings::new();
//!
//! settings
//!     .define_settings(
//!         "main",
//!         vec![
//!             ("confdir", SettingAttrs::new("Config dir.").default("/etc/app")),
//!             (
//!                 "ssldir",
//!                 SettingAttrs::new("Where SSL state lives.")
//!                     .kind(SettingType::Directory)
//!                     .default("$confdir/ssl"),
//!             ),
//!         ],
//!     )
//!     .unwrap();
//!
//! // Defaults interpolate through the full resolution algorithm
//! assert_eq!(
//!     settings.string_value("ssldir", None).unwrap().unwrap(),
//!     "/etc/app/ssl"
//! );
//!
//! // Overrides invalidate the cache and win by precedence
//! settings.set("confdir", "/srv/app").unwrap();
//! assert_eq!(
//!     settings.string_value("ssldir", None).unwrap().unwrap(),
//!     "/srv/app/ssl"
//! );
//! ```
//!
//! ## Configuration Files
//!
//! The on-disk format is an INI-like line grammar with an implicit
//! `main` section and optional per-setting file metadata:
//!
//! ```text
//! confdir = /etc/app
//!
//! [master]
//! ssldir = $vardir/ssl { owner = app, mode = 771 }
//! ```
//!
//! [`Settings::parse`] merges a system-wide file with a user-specific
//! one, wholesale-replacing the file-sourced layers atomically: a parse
//! error in any candidate file leaves the previous values untouched.
//!
//! ## Error Handling
//!
//! All operations return [`SettingsResult<T>`], an alias for
//! `Result<T, SettingsError>`:
//!
//! ```rust
//! use stratix::{Settings, SettingsError};
//!
//! let settings = Settings::new();
//! match settings.set("nonexistent", "value") {
//!     Ok(()) => println!("stored"),
//!     Err(SettingsError::UnknownSetting { name }) => println!("no setting {name}"),
//!     Err(e) => println!("error: {e}"),
//! }
//! ```

pub mod cache;
pub mod definition;
pub mod error;
pub mod hooks;
pub mod interpolate;
pub mod parser;
pub mod realize;
pub mod search;
pub mod settings;
pub mod store;
pub mod value;

#[cfg(unix)]
pub mod writer;

// Re-export main types for convenience
pub use definition::{ArgDescriptor, FileMetadata, OptionArity, SettingAttrs, SettingType};
pub use error::{SettingsError, SettingsResult};
pub use hooks::SettingHook;
pub use realize::{ProvisioningPlan, ResourceApplier, ResourceIntent, ResourceKind};
pub use search::RunMode;
pub use settings::Settings;
pub use store::LayerKey;
pub use value::SettingValue;

#[cfg(feature = "cli")]
pub mod cli;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
