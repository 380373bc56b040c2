use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};

use flatgit_repo::Repository;
use tracing::{debug, warn};

use crate::commands;
use crate::error::{HelperError, HelperResult};

/// One conversation with git over stdin/stdout.
pub struct Session<'a> {
    repo: &'a Repository,
    options: BTreeMap<String, String>,
}

impl<'a> Session<'a> {
    pub fn new(repo: &'a Repository) -> Self {
        Self {
            repo,
            options: BTreeMap::new(),
        }
    }

    pub fn repo(&self) -> &Repository {
        self.repo
    }

    #[cfg(test)]
    pub fn option(&self, name: &str) -> Option<&str> {
        self.options.get(name).map(String::as_str)
    }

    pub(crate) fn set_option(&mut self, name: &str, value: &str) {
        self.options.insert(name.to_string(), value.to_string());
    }

    /// Serve commands until EOF or an empty line.
    ///
    /// The first failing command ends the session with its error.
    pub fn run(&mut self, input: &mut dyn BufRead, out: &mut dyn Write) -> HelperResult<()> {
        let mut line = String::new();
        loop {
            line.clear();
            if input.read_line(&mut line)? == 0 {
                debug!("stdin closed");
                return Ok(());
            }
            let command = line.trim_end_matches(['\n', '\r']);
            if command.trim().is_empty() {
                debug!("empty line, ending session");
                return Ok(());
            }
            debug!(line = command, "on stdin");
            self.dispatch(command, out)?;

            match out.flush() {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                    warn!("git closed the connection");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn dispatch(&mut self, command: &str, out: &mut dyn Write) -> HelperResult<()> {
        let mut words = command.split(' ');
        let name = words.next().unwrap_or_default();
        let args: Vec<&str> = words.collect();
        let entry = commands::find(name).ok_or_else(|| HelperError::UnknownCommand(name.to_string()))?;
        (entry.handler)(self, out, &args)
    }
}
