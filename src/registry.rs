//! Process-level collection of named sessions.
//!
//! The registry is the control surface used by a test harness: it creates
//! sessions on first use, applies options and rules, starts and waits for
//! workers, and tears everything down with [`Registry::reset_all`].
//!
//! Every configuration entry point performs the implicit wait
//! ([`Session::quiesce`]) before touching a running session, so scripts may
//! reconfigure a session without waiting for it explicitly.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::config::{RegistryConfig, SourceConfig};
use crate::error::{ConfigError, LogExpectResult};
use crate::rule::Rule;
use crate::session::Session;
use crate::source::LogSource;
use crate::worker::RunId;

/// Named sessions sharing one log source.
pub struct Registry {
    sessions: HashMap<String, Session>,
    source: Arc<dyn LogSource>,
    config: RegistryConfig,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.sessions.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("Registry")
            .field("sessions", &names)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Registry {
    /// Registry with default settings.
    pub fn new(source: Arc<dyn LogSource>) -> Self {
        Self::with_config(source, RegistryConfig::default())
    }

    /// Registry with explicit settings.
    pub fn with_config(source: Arc<dyn LogSource>, config: RegistryConfig) -> Self {
        Self {
            sessions: HashMap::new(),
            source,
            config,
        }
    }

    /// Settings applied to every worker.
    #[must_use]
    pub const fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Number of known sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// True if no session exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Looks up a session without creating it.
    #[must_use]
    pub fn session(&self, name: &str) -> Option<&Session> {
        self.sessions.get(name)
    }

    fn entry<'s>(sessions: &'s mut HashMap<String, Session>, name: &str) -> Result<&'s mut Session, ConfigError> {
        match sessions.entry(name.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let session = Session::new(name)?;
                debug!(session = %name, "created");
                Ok(entry.insert(session))
            }
        }
    }

    /// Returns the session called `name`, creating an idle one if absent.
    pub fn create_or_get(&mut self, name: &str) -> Result<&mut Session, ConfigError> {
        Self::entry(&mut self.sessions, name)
    }

    /// Replaces a session's source configuration, waiting for a running
    /// worker first.
    pub fn set_source(&mut self, name: &str, config: SourceConfig) -> LogExpectResult<()> {
        let session = Self::entry(&mut self.sessions, name)?;
        session.quiesce()?;
        session.configure(config)?;
        Ok(())
    }

    /// Compiles and appends one rule (`skip vxid tag [regex]`).
    pub fn add_rule(&mut self, name: &str, args: &[&str]) -> LogExpectResult<()> {
        let session = Self::entry(&mut self.sessions, name)?;
        session.quiesce()?;
        session.add_rule(args)?;
        Ok(())
    }

    /// Replaces a session's rule list, waiting for a running worker first.
    pub fn replace_rules(&mut self, name: &str, rules: Vec<Rule>) -> LogExpectResult<()> {
        let session = Self::entry(&mut self.sessions, name)?;
        session.quiesce()?;
        session.replace_rules(rules)?;
        Ok(())
    }

    /// Executes a logexpect command line: options are applied in order, and
    /// `-start`, `-wait` and `-run` act on the session where they appear.
    /// Every argument except `-wait` first waits for a running worker.
    ///
    /// ```text
    /// l1 -v v1 -g raw -q "ReqURL ~ \"/foo\"" -start
    /// ```
    pub fn command(&mut self, name: &str, args: &[&str]) -> LogExpectResult<()> {
        let session = Self::entry(&mut self.sessions, name)?;
        let mut args = args.iter().copied();
        while let Some(flag) = args.next() {
            match flag {
                "-start" => {
                    session.quiesce()?;
                    session.start(self.source.as_ref(), &self.config)?;
                }
                "-wait" => session.wait()?,
                "-run" => {
                    session.quiesce()?;
                    session.start(self.source.as_ref(), &self.config)?;
                    session.wait()?;
                }
                _ => {
                    session.quiesce()?;
                    let value = if SourceConfig::takes_value(flag) {
                        Some(args.next().ok_or_else(|| ConfigError::MissingArgument {
                            flag: flag.to_string(),
                        })?)
                    } else {
                        None
                    };
                    session.apply_arg(flag, value)?;
                }
            }
        }
        Ok(())
    }

    /// Opens the log and spawns the session's worker.
    pub fn start(&mut self, name: &str) -> LogExpectResult<RunId> {
        let session = Self::entry(&mut self.sessions, name)?;
        session.start(self.source.as_ref(), &self.config)
    }

    /// Blocks until the session's worker finishes and returns its verdict.
    pub fn wait(&mut self, name: &str) -> LogExpectResult<()> {
        match self.sessions.get_mut(name) {
            Some(session) => session.wait(),
            None => Err(ConfigError::NotStarted { name: name.to_string() }.into()),
        }
    }

    /// Start followed by wait.
    pub fn run(&mut self, name: &str) -> LogExpectResult<()> {
        self.start(name)?;
        self.wait(name)
    }

    /// Requests cancellation of a session's worker without waiting.
    pub fn cancel(&self, name: &str) {
        if let Some(session) = self.sessions.get(name) {
            session.cancel();
        }
    }

    /// Cancels and joins every running worker, then forgets all sessions.
    /// Verdicts of cancelled workers are discarded.
    pub fn reset_all(&mut self) {
        for session in self.sessions.values() {
            session.cancel();
        }
        let mut names: Vec<String> = Vec::with_capacity(self.sessions.len());
        for (name, mut session) in self.sessions.drain() {
            session.shutdown();
            names.push(name);
        }
        if !names.is_empty() {
            names.sort_unstable();
            debug!(sessions = ?names, "reset");
        }
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        self.reset_all();
    }
}
