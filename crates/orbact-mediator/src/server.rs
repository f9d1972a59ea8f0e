//! Per-server lifecycle state.
//!
//! Every managed server id owns one [`ServerRecord`] for the life of the
//! mediator; its process handle churns across process generations. The
//! transitions here are the pure part of the state machine: anything that
//! needs the repository or the spawner lives in the supervisor, anything
//! that needs the queue or the broker lives in the mediator. Callers hold
//! the record's lock across a transition and run follow-up work (queue
//! replay) only after releasing it.

use std::fmt;
use tokio::time::Instant;

use orbact_common::{AddrTemplate, ServerId};

use crate::process::Process;

/// Lifecycle state of a managed server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// No process, none requested.
    Inactive,
    /// Process launched, readiness not yet announced.
    Started,
    /// Process announced readiness; invocations flow.
    Active,
    /// Administratively paused: new work queues, no process is started.
    Holding,
    /// Administrative shutdown requested or confirmed; a process may still
    /// be exiting.
    Stopped,
    /// Process exited before announcing readiness; restarts are refused for
    /// the backoff window.
    Failed,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServerState::Inactive => "inactive",
            ServerState::Started => "started",
            ServerState::Active => "active",
            ServerState::Holding => "holding",
            ServerState::Stopped => "stopped",
            ServerState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Mutable per-server state. Invariants: a present process handle implies
/// state is one of Started/Active/Holding/Stopped; `failed_at` is only
/// meaningful in Failed; at most one handle exists at a time.
pub struct ServerRecord {
    id: ServerId,
    pub state: ServerState,
    /// Advertised reference template, set when the server first connects.
    pub template: Option<AddrTemplate>,
    /// Handle of the running process generation, if any.
    pub process: Option<Box<dyn Process>>,
    /// Instant of the most recent unconfirmed-start failure.
    pub failed_at: Option<Instant>,
}

impl ServerRecord {
    pub fn new(id: impl Into<ServerId>) -> Self {
        Self {
            id: id.into(),
            state: ServerState::Inactive,
            template: None,
            process: None,
            failed_at: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether a process handle exists and has not been observed to exit.
    pub fn has_live_process(&self) -> bool {
        self.process.as_ref().is_some_and(|p| !p.has_exited())
    }

    /// Whether the record is Failed inside the restart-backoff window.
    pub fn in_backoff(&self, window: std::time::Duration) -> bool {
        self.state == ServerState::Failed
            && self.failed_at.is_some_and(|at| at.elapsed() < window)
    }

    /// Drop a handle whose process already exited. Handle reuse is
    /// forbidden, so this must run before a new process is attached.
    pub fn release_finished_process(&mut self) {
        if self.process.as_ref().is_some_and(|p| p.has_exited()) {
            self.process = None;
        }
    }

    /// Readiness announce. Returns false when Stopped/Holding take
    /// precedence and the announce is ignored.
    pub fn activate(&mut self) -> bool {
        if matches!(self.state, ServerState::Stopped | ServerState::Holding) {
            return false;
        }
        self.state = ServerState::Active;
        true
    }

    /// Administrative deactivation: Active becomes Inactive, Holding becomes
    /// Stopped, Stopped stays. The process handle is detached and released.
    ///
    /// # Panics
    ///
    /// From Inactive, Started, or Failed: there is nothing to deactivate and
    /// reaching here is a logic defect.
    pub fn deactivate(&mut self) {
        match self.state {
            ServerState::Active => self.state = ServerState::Inactive,
            ServerState::Holding => self.state = ServerState::Stopped,
            ServerState::Stopped => {}
            state => panic!("deactivate: server '{}' in state {state}", self.id),
        }
        if let Some(proc) = self.process.take() {
            proc.detach();
        }
    }

    /// Administrative pause. Idempotent; Stopped stays Stopped.
    pub fn hold(&mut self) {
        if self.state != ServerState::Stopped {
            self.state = ServerState::Holding;
        }
    }

    /// Administrative continue. Returns true when the record moved to
    /// Inactive and queued work should replay.
    pub fn resume(&mut self) -> bool {
        match self.state {
            ServerState::Inactive | ServerState::Started | ServerState::Active => false,
            ServerState::Failed | ServerState::Stopped | ServerState::Holding => {
                self.state = ServerState::Inactive;
                self.failed_at = None;
                true
            }
        }
    }

    /// Process-exit notification. Releases the handle and returns the
    /// resulting state; a Started server that exits is Failed as of `now`.
    ///
    /// # Panics
    ///
    /// In Inactive or Failed no process exists to exit; reaching here is a
    /// logic defect.
    pub fn on_process_exit(&mut self, now: Instant) -> ServerState {
        match self.state {
            ServerState::Active => self.state = ServerState::Inactive,
            ServerState::Started => {
                self.state = ServerState::Failed;
                self.failed_at = Some(now);
            }
            ServerState::Stopped => {}
            ServerState::Holding => self.state = ServerState::Stopped,
            state => panic!("process exit: server '{}' in state {state}", self.id),
        }
        self.process = None;
        self.state
    }
}

impl fmt::Debug for ServerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerRecord")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("template", &self.template)
            .field("process", &self.process.as_ref().map(|_| "<handle>"))
            .field("failed_at", &self.failed_at)
            .finish()
    }
}
