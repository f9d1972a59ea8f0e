//! On-demand process start and crash backoff.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use orbact_common::{OrbactError, Repository, Result};

use crate::process::{ExitSender, ProcessSpawner};
use crate::server::{ServerRecord, ServerState};

/// References handed to every launched server so it can reach back: the
/// repositories it needs, and the mediator itself (launched servers call
/// back on it to register and announce readiness).
#[derive(Debug, Clone, Default)]
pub struct LaunchRefs {
    pub repository_ref: String,
    pub interface_repository_ref: Option<String>,
    pub mediator_ref: String,
}

/// Starts server processes on demand and applies the restart-backoff policy.
///
/// A server that crashed before announcing readiness is refused a restart
/// for the backoff window: without the pause, the very invocation that
/// started a doomed server would restart it on every retry. `force_activate`
/// resets the record to Inactive first and thereby bypasses the window.
pub struct Supervisor {
    repository: Arc<dyn Repository>,
    spawner: Arc<dyn ProcessSpawner>,
    exits: ExitSender,
    refs: LaunchRefs,
    restart_backoff: Duration,
}

impl Supervisor {
    pub fn new(
        repository: Arc<dyn Repository>,
        spawner: Arc<dyn ProcessSpawner>,
        exits: ExitSender,
        refs: LaunchRefs,
        restart_backoff: Duration,
    ) -> Self {
        Self {
            repository,
            spawner,
            exits,
            refs,
            restart_backoff,
        }
    }

    /// Make sure a process for `rec` is running or starting. The caller
    /// holds the record's lock.
    ///
    /// - Started/Active: success, nothing to do
    /// - Failed inside the backoff window: refused without spawning
    /// - Failed past the window: reset to Inactive and started
    /// - Inactive: resolve the launch command from the repository, release
    ///   a finished previous handle, spawn, and move to Started
    ///
    /// Readiness is only ever declared by the server's own announce; a
    /// successful return here means Started, not Active.
    ///
    /// # Panics
    ///
    /// From Stopped or Holding: callers queue instead of starting in those
    /// states, so reaching here is a logic defect.
    pub fn ensure_started(&self, rec: &mut ServerRecord) -> Result<()> {
        match rec.state {
            ServerState::Started | ServerState::Active => return Ok(()),
            ServerState::Failed => {
                if rec.in_backoff(self.restart_backoff) {
                    return Err(OrbactError::BackoffActive(rec.id().to_string()));
                }
                rec.state = ServerState::Inactive;
                rec.failed_at = None;
            }
            ServerState::Inactive => {}
            state => panic!("ensure_started: server '{}' in state {state}", rec.id()),
        }

        let defs = self.repository.find_by_name(rec.id());
        let def = defs.first().ok_or_else(|| {
            OrbactError::StartFailure(format!("no repository entry for '{}'", rec.id()))
        })?;
        if def.command().is_empty() {
            return Err(OrbactError::StartFailure(format!(
                "empty launch command for '{}'",
                rec.id()
            )));
        }

        let command = self.compose_command(def.command(), rec.id());
        rec.release_finished_process();

        let id = rec.id().to_string();
        match self.spawner.spawn(&id, &command, self.exits.clone()) {
            Ok(proc) => {
                rec.state = ServerState::Started;
                rec.process = Some(proc);
                info!(server = %id, "server process started");
                Ok(())
            }
            Err(error) => {
                warn!(server = %id, %error, "server process failed to start");
                Err(error)
            }
        }
    }

    /// Full launch command: the repository's command line plus the fixed
    /// flags every mediated server understands.
    fn compose_command(&self, base: &str, id: &str) -> String {
        let mut command = String::from(base);
        command.push_str(" --impl-name ");
        command.push_str(id);
        command.push_str(" --repo-ref ");
        command.push_str(&self.refs.repository_ref);
        if let Some(iface_ref) = &self.refs.interface_repository_ref {
            command.push_str(" --iface-repo-ref ");
            command.push_str(iface_ref);
        }
        command.push_str(" --mediator-ref ");
        command.push_str(&self.refs.mediator_ref);
        command
    }
}
