//! Command line integration for the settings registry.
//!
//! Every setting already describes its own option through
//! [`SettingDefinition::arg_descriptor`](crate::definition::SettingDefinition::arg_descriptor);
//! this module turns those descriptors into clap arguments and binds
//! parsed matches back into the engine's `cli` layer. Booleans follow
//! the GNU convention: `--daemonize` turns a flag on and the hidden
//! `--no-daemonize` turns it off.

use clap::parser::ValueSource;
use clap::{Arg, ArgAction, ArgMatches, Command};

use crate::definition::OptionArity;
use crate::error::SettingsResult;
use crate::settings::Settings;

/// Adds one argument per registered setting to a clap command.
///
/// # Example
/// ```
/// use clap::Command;
/// use stratix::{Settings, SettingAttrs, SettingType};
/// use stratix::cli::{augment_command, bind_matches};
///
/// let mut settings = Settings::new();
/// settings
///     .define_settings(
///         "main",
///         vec![
///             ("confdir", SettingAttrs::new("Config dir.").default("/etc/app")),
///             (
///                 "daemonize",
///                 SettingAttrs::new("Run in the background.").kind(SettingType::Boolean),
///             ),
///         ],
///     )
///     .unwrap();
///
/// let command = augment_command(&settings, Command::new("app"));
/// let matches = command
///     .try_get_matches_from(["app", "--confdir", "/opt/app", "--daemonize"])
///     .unwrap();
/// bind_matches(&settings, &matches).unwrap();
///
/// assert_eq!(
///     settings.string_value("confdir", None).unwrap().unwrap(),
///     "/opt/app"
/// );
/// ```
pub fn augment_command(settings: &Settings, mut command: Command) -> Command {
    for name in settings.setting_names() {
        let Some(definition) = settings.definition(&name) else {
            continue;
        };
        let descriptor = definition.arg_descriptor();

        let mut arg = Arg::new(descriptor.long.clone())
            .long(descriptor.long.clone())
            .help(descriptor.help.clone());
        if let Some(short) = descriptor.short {
            arg = arg.short(short);
        }
        arg = match descriptor.arity {
            OptionArity::Boolean => arg.action(ArgAction::SetTrue),
            OptionArity::Valued => arg.action(ArgAction::Set).value_name("VALUE"),
        };
        command = command.arg(arg);

        if descriptor.arity == OptionArity::Boolean {
            let negation = format!("no-{}", descriptor.long);
            command = command.arg(
                Arg::new(negation.clone())
                    .long(negation)
                    .action(ArgAction::SetTrue)
                    .overrides_with(descriptor.long.clone())
                    .hide(true),
            );
        }
    }
    command
}

/// Writes every option present on the command line into the `cli`
/// layer.
///
/// `matches` must come from a command built with
/// [`augment_command`] over the same registry.
pub fn bind_matches(settings: &Settings, matches: &ArgMatches) -> SettingsResult<()> {
    for name in settings.setting_names() {
        let Some(definition) = settings.definition(&name) else {
            continue;
        };
        match definition.arg_descriptor().arity {
            OptionArity::Boolean => {
                let negation = format!("no-{name}");
                if matches.value_source(&negation) == Some(ValueSource::CommandLine)
                    && matches.get_flag(&negation)
                {
                    settings.handle_arg(&negation, None)?;
                } else if matches.value_source(name.as_str()) == Some(ValueSource::CommandLine)
                    && matches.get_flag(name.as_str())
                {
                    settings.handle_arg(&name, None)?;
                }
            }
            OptionArity::Valued => {
                if matches.value_source(name.as_str()) == Some(ValueSource::CommandLine) {
                    if let Some(value) = matches.get_one::<String>(name.as_str()) {
                        settings.handle_arg(&name, Some(value))?;
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{SettingAttrs, SettingType};

    fn cli_settings() -> Settings {
        let mut settings = Settings::new();
        settings
            .define_settings(
                "main",
                vec![
                    (
                        "confdir",
                        SettingAttrs::new("Config dir.").default("/etc/app"),
                    ),
                    (
                        "daemonize",
                        SettingAttrs::new("Run in the background.")
                            .kind(SettingType::Boolean)
                            .default("true"),
                    ),
                    (
                        "verbose",
                        SettingAttrs::new("Verbose output.")
                            .kind(SettingType::Boolean)
                            .short('v'),
                    ),
                ],
            )
            .unwrap();
        settings
    }

    fn command(settings: &Settings) -> Command {
        augment_command(settings, Command::new("app").disable_help_flag(true))
    }

    #[test]
    fn test_valued_option_binds() {
        let settings = cli_settings();
        let matches = command(&settings)
            .try_get_matches_from(["app", "--confdir", "/opt/app"])
            .unwrap();
        bind_matches(&settings, &matches).unwrap();
        assert_eq!(
            settings.string_value("confdir", None).unwrap().unwrap(),
            "/opt/app"
        );
    }

    #[test]
    fn test_boolean_flag_and_negation() {
        let settings = cli_settings();
        let matches = command(&settings)
            .try_get_matches_from(["app", "--no-daemonize"])
            .unwrap();
        bind_matches(&settings, &matches).unwrap();
        assert_eq!(settings.bool_value("daemonize", None).unwrap(), Some(false));

        let settings = cli_settings();
        let matches = command(&settings)
            .try_get_matches_from(["app", "--daemonize"])
            .unwrap();
        bind_matches(&settings, &matches).unwrap();
        assert_eq!(settings.bool_value("daemonize", None).unwrap(), Some(true));
    }

    #[test]
    fn test_short_alias_binds() {
        let settings = cli_settings();
        let matches = command(&settings)
            .try_get_matches_from(["app", "-v"])
            .unwrap();
        bind_matches(&settings, &matches).unwrap();
        assert_eq!(settings.bool_value("verbose", None).unwrap(), Some(true));
    }

    #[test]
    fn test_absent_options_leave_defaults() {
        let settings = cli_settings();
        let matches = command(&settings).try_get_matches_from(["app"]).unwrap();
        bind_matches(&settings, &matches).unwrap();
        assert_eq!(
            settings.string_value("confdir", None).unwrap().unwrap(),
            "/etc/app"
        );
        assert_eq!(settings.bool_value("daemonize", None).unwrap(), Some(true));
    }
}
