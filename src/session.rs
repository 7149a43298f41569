//! A named expectation session.
//!
//! A session holds an ordered rule list and a source configuration. Starting
//! it opens the log and hands both to a worker thread; waiting collects the
//! verdict. Rules and configuration can only change while no worker is
//! active.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::{RegistryConfig, SourceConfig};
use crate::error::{ConfigError, LogExpectResult};
use crate::rule::Rule;
use crate::source::LogSource;
use crate::worker::{Outcome, RunId, RunReport, WorkerHandle, WorkerSpec};

#[derive(Debug)]
enum RunState {
    Idle,
    Running(WorkerHandle),
    Completed(RunReport),
}

/// One named logexpect instance.
#[derive(Debug)]
pub struct Session {
    name: String,
    rules: Vec<Rule>,
    config: SourceConfig,
    state: RunState,
}

impl Session {
    /// Creates an idle session with no rules and a default source config.
    ///
    /// # Errors
    /// `InvalidName` unless `name` starts with `l`.
    pub fn new(name: impl Into<String>) -> Result<Self, ConfigError> {
        let name = name.into();
        if !name.starts_with('l') {
            return Err(ConfigError::InvalidName { name });
        }
        Ok(Self {
            name,
            rules: Vec::new(),
            config: SourceConfig::default(),
            state: RunState::Idle,
        })
    }

    /// The session's unique name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rules in evaluation order.
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Source configuration used by the next start.
    #[must_use]
    pub const fn config(&self) -> &SourceConfig {
        &self.config
    }

    /// True while a worker is attached.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self.state, RunState::Running(_))
    }

    /// Id of the active run, if any.
    #[must_use]
    pub fn run_id(&self) -> Option<RunId> {
        match &self.state {
            RunState::Running(handle) => Some(handle.run_id()),
            RunState::Completed(report) => Some(report.run_id),
            RunState::Idle => None,
        }
    }

    /// Report of the most recently waited run.
    #[must_use]
    pub const fn last_report(&self) -> Option<&RunReport> {
        match &self.state {
            RunState::Completed(report) => Some(report),
            _ => None,
        }
    }

    fn ensure_idle(&self) -> Result<(), ConfigError> {
        if self.is_running() {
            return Err(ConfigError::SessionRunning {
                name: self.name.clone(),
            });
        }
        Ok(())
    }

    /// Replaces the source configuration.
    pub fn configure(&mut self, config: SourceConfig) -> Result<(), ConfigError> {
        self.ensure_idle()?;
        self.config = config;
        Ok(())
    }

    /// Applies one script option to the source configuration.
    pub fn apply_arg(&mut self, flag: &str, value: Option<&str>) -> Result<(), ConfigError> {
        self.ensure_idle()?;
        self.config.apply_arg(flag, value)
    }

    /// Compiles `args` (`skip vxid tag [regex]`) and appends the rule. The
    /// pattern honours the caseless flag as currently configured.
    pub fn add_rule(&mut self, args: &[&str]) -> Result<(), ConfigError> {
        self.ensure_idle()?;
        let rule = Rule::compile(args, self.config.is_caseless())?;
        self.push_rule(rule)
    }

    /// Appends an already compiled rule.
    pub fn push_rule(&mut self, rule: Rule) -> Result<(), ConfigError> {
        self.ensure_idle()?;
        if self.rules.is_empty() && rule.has_backreference() {
            warn!(
                session = %self.name,
                rule = %rule,
                "first rule uses a backreference and can never match"
            );
        }
        self.rules.push(rule);
        Ok(())
    }

    /// Replaces the whole rule list.
    pub fn replace_rules(&mut self, rules: Vec<Rule>) -> Result<(), ConfigError> {
        self.ensure_idle()?;
        if rules.first().is_some_and(Rule::has_backreference) {
            warn!(session = %self.name, "first rule uses a backreference and can never match");
        }
        self.rules = rules;
        Ok(())
    }

    /// Opens the log and spawns a worker.
    ///
    /// # Errors
    /// - `Config(SessionRunning)` if a worker is already attached
    /// - `Config(MissingEndpoint)` if no endpoint was configured
    /// - `Source` if the log cannot be opened; no worker is spawned
    /// - `Internal` if the worker thread cannot be created
    pub fn start(&mut self, source: &dyn LogSource, registry: &RegistryConfig) -> LogExpectResult<RunId> {
        self.ensure_idle()?;
        if self.config.endpoint.is_none() {
            return Err(ConfigError::MissingEndpoint.into());
        }

        let cursor = source.open(&self.config)?;
        let spec = WorkerSpec {
            session: self.name.clone(),
            rules: self.rules.clone(),
            filter: self.config.filter.clone(),
            query: self.config.query.clone(),
            poll_interval: registry.poll_interval,
            excerpt_limit: registry.payload_excerpt_limit,
            thread_name: format!("{}-{}", registry.thread_name_prefix, self.name),
        };
        let handle = WorkerHandle::spawn(spec, cursor)?;
        let run_id = handle.run_id();
        debug!(session = %self.name, run = %run_id, rules = self.rules.len(), "started");
        self.state = RunState::Running(handle);
        Ok(run_id)
    }

    /// Blocks until the worker finishes and surfaces its verdict. Waiting
    /// again on a completed session repeats the last verdict.
    ///
    /// # Errors
    /// - `Expectation` if a record violated a rule
    /// - `Source` if the log failed
    /// - `Config(NotStarted)` if the session was never started
    /// - `Internal` if the worker died without a verdict
    pub fn wait(&mut self) -> LogExpectResult<()> {
        match std::mem::replace(&mut self.state, RunState::Idle) {
            RunState::Idle => Err(ConfigError::NotStarted {
                name: self.name.clone(),
            }
            .into()),
            RunState::Completed(report) => {
                let outcome = report.outcome.clone();
                self.state = RunState::Completed(report);
                outcome.into_result()
            }
            RunState::Running(handle) => {
                info!(session = %self.name, run = %handle.run_id(), "waiting");
                let report = handle.join()?;
                let outcome = report.outcome.clone();
                self.state = RunState::Completed(report);
                outcome.into_result()
            }
        }
    }

    /// Like [`Session::wait`], but gives up after `timeout`. Returns
    /// `Ok(false)` if the worker is still running.
    pub fn wait_timeout(&mut self, timeout: Duration) -> LogExpectResult<bool> {
        if let RunState::Running(handle) = &mut self.state {
            if !handle.poll_timeout(timeout) {
                return Ok(false);
            }
        }
        self.wait().map(|()| true)
    }

    /// The implicit wait performed before reconfiguring: a no-op on an idle
    /// session, otherwise [`Session::wait`].
    pub fn quiesce(&mut self) -> LogExpectResult<()> {
        if self.is_running() {
            debug!(session = %self.name, "implicit wait before reconfiguration");
            return self.wait();
        }
        Ok(())
    }

    /// Requests cancellation of the active worker, if any.
    pub fn cancel(&self) {
        if let RunState::Running(handle) = &self.state {
            debug!(session = %self.name, run = %handle.run_id(), "cancel requested");
            handle.cancel();
        }
    }

    /// Cancels and joins the active worker. Verdicts of cancelled runs are
    /// discarded.
    pub(crate) fn shutdown(&mut self) {
        let RunState::Running(handle) = std::mem::replace(&mut self.state, RunState::Idle) else {
            return;
        };
        handle.cancel();
        match handle.join() {
            Ok(report) => {
                if !matches!(report.outcome, Outcome::Cancelled) {
                    debug!(session = %self.name, outcome = ?report.outcome, "finished before cancellation");
                }
                self.state = RunState::Completed(report);
            }
            Err(err) => warn!(session = %self.name, error = %err, "worker lost during shutdown"),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}
