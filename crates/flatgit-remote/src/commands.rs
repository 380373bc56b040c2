//! The command table and its handlers.
//!
//! Every command git may send is declared once in [`COMMANDS`];
//! `capabilities` advertises exactly that table.

use std::io::Write;

use flatgit_repo::RefValue;
use tracing::debug;

use crate::error::{HelperError, HelperResult};
use crate::session::Session;

type Handler = fn(&mut Session<'_>, &mut dyn Write, &[&str]) -> HelperResult<()>;

pub struct HelperCommand {
    pub name: &'static str,
    /// Advertised with a leading `*`: git must understand it or stop.
    pub required: bool,
    pub handler: Handler,
}

pub const COMMANDS: &[HelperCommand] = &[
    HelperCommand {
        name: "capabilities",
        required: false,
        handler: capabilities,
    },
    HelperCommand {
        name: "option",
        required: false,
        handler: option,
    },
    HelperCommand {
        name: "list",
        required: false,
        handler: list,
    },
];

/// Options git may set; anything else is answered `unsupported`.
pub const SUPPORTED_OPTIONS: &[&str] = &["verbosity", "progress"];

pub fn find(name: &str) -> Option<&'static HelperCommand> {
    COMMANDS.iter().find(|command| command.name == name)
}

/// Capability lines for `table`, without `capabilities` itself.
pub fn capability_lines(table: &[HelperCommand]) -> Vec<String> {
    table
        .iter()
        .filter(|command| command.name != "capabilities")
        .map(|command| {
            if command.required {
                format!("*{}", command.name)
            } else {
                command.name.to_string()
            }
        })
        .collect()
}

fn capabilities(_: &mut Session<'_>, out: &mut dyn Write, args: &[&str]) -> HelperResult<()> {
    no_arguments("capabilities", args)?;
    let lines = capability_lines(COMMANDS);
    debug!(?lines, "sending capabilities");
    for line in lines {
        writeln!(out, "{line}")?;
    }
    writeln!(out)?;
    Ok(())
}

fn option(session: &mut Session<'_>, out: &mut dyn Write, args: &[&str]) -> HelperResult<()> {
    let [name, value @ ..] = args else {
        return Err(HelperError::BadArguments {
            command: "option",
            detail: "missing option name".into(),
        });
    };
    if !SUPPORTED_OPTIONS.contains(name) {
        debug!(option = name, "unsupported option");
        writeln!(out, "unsupported")?;
        return Ok(());
    }
    if value.is_empty() {
        writeln!(out, "error missing value for {name}")?;
        return Ok(());
    }
    session.set_option(name, &value.join(" "));
    writeln!(out, "ok")?;
    Ok(())
}

fn list(session: &mut Session<'_>, out: &mut dyn Write, args: &[&str]) -> HelperResult<()> {
    match args {
        [] | ["for-push"] => {}
        _ => {
            return Err(HelperError::BadArguments {
                command: "list",
                detail: args.join(" "),
            })
        }
    }
    let refs = session.repo().list_refs()?;
    debug!(count = refs.len(), "listing refs");
    for (name, value) in refs {
        match value {
            RefValue::Direct(id) => writeln!(out, "{id} {name}")?,
            RefValue::Symbolic(target) => writeln!(out, "@{target} {name}")?,
        }
    }
    writeln!(out)?;
    Ok(())
}

fn no_arguments(command: &'static str, args: &[&str]) -> HelperResult<()> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(HelperError::BadArguments {
            command,
            detail: format!("unexpected {:?}", args.join(" ")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &mut Session<'_>, _: &mut dyn Write, _: &[&str]) -> HelperResult<()> {
        Ok(())
    }

    #[test]
    fn table_lookup() {
        assert!(find("list").is_some());
        assert!(find("option").is_some());
        assert!(find("fetch").is_none());
    }

    #[test]
    fn required_commands_are_starred() {
        let table = [
            HelperCommand {
                name: "capabilities",
                required: false,
                handler: noop,
            },
            HelperCommand {
                name: "connect",
                required: true,
                handler: noop,
            },
            HelperCommand {
                name: "list",
                required: false,
                handler: noop,
            },
        ];
        assert_eq!(capability_lines(&table), vec!["*connect", "list"]);
        assert_eq!(capability_lines(COMMANDS), vec!["option", "list"]);
    }
}
