//! The process-spawn primitive.
//!
//! A [`Process`] is the handle one server generation lives behind:
//! terminate it, ask whether it exited, or detach it so its exit is no
//! longer reported. Exits are confirmed on a channel rather than through
//! the handle, giving the mediator a single linearized consumer for exit
//! events wherever they originate.
//!
//! [`LocalSpawner`] is the production implementation: it launches the
//! command through the system shell and watches the child from a monitor
//! task. Handles are plain data and safe to drop at any time; the monitor
//! task owns the child itself.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use orbact_common::{OrbactError, Result, ServerId};

/// Sends the owning server's id when its process exits.
pub type ExitSender = mpsc::UnboundedSender<ServerId>;
/// Receives exit notifications; consumed by the mediator's dispatcher.
pub type ExitReceiver = mpsc::UnboundedReceiver<ServerId>;

/// Handle to a running (or exited) server process.
pub trait Process: Send + Sync {
    /// Ask the process to terminate. Best-effort signal; the exit itself is
    /// confirmed through the exit channel.
    fn terminate(&self);

    /// Whether the process has been observed to exit.
    fn has_exited(&self) -> bool;

    /// Stop tracking the process: it keeps running, but no exit event will
    /// be reported for it.
    fn detach(&self);
}

/// Launches server processes.
pub trait ProcessSpawner: Send + Sync {
    /// Spawn `command` for server `id`. On exit, implementations send `id`
    /// on `exits` unless the handle was detached first.
    fn spawn(&self, id: &ServerId, command: &str, exits: ExitSender) -> Result<Box<dyn Process>>;
}

const CHILD_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Spawner backed by the local system: `sh -c <command>`.
///
/// Must be used from within a tokio runtime; each spawn starts a monitor
/// task that polls the child and reports its exit.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalSpawner;

struct LocalProcess {
    exited: Arc<AtomicBool>,
    detached: Arc<AtomicBool>,
    term_requested: Arc<AtomicBool>,
}

impl Process for LocalProcess {
    fn terminate(&self) {
        self.term_requested.store(true, Ordering::SeqCst);
    }

    fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }

    fn detach(&self) {
        self.detached.store(true, Ordering::SeqCst);
    }
}

impl ProcessSpawner for LocalSpawner {
    fn spawn(&self, id: &ServerId, command: &str, exits: ExitSender) -> Result<Box<dyn Process>> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| OrbactError::StartFailure(format!("spawn failed for '{id}': {e}")))?;

        let exited = Arc::new(AtomicBool::new(false));
        let detached = Arc::new(AtomicBool::new(false));
        let term_requested = Arc::new(AtomicBool::new(false));

        let handle = LocalProcess {
            exited: exited.clone(),
            detached: detached.clone(),
            term_requested: term_requested.clone(),
        };

        let id = id.clone();
        tokio::spawn(async move {
            let mut killed = false;
            loop {
                if term_requested.load(Ordering::SeqCst) && !killed {
                    killed = true;
                    if let Err(error) = child.start_kill() {
                        warn!(server = %id, %error, "failed to signal server process");
                    }
                }
                match child.try_wait() {
                    Ok(Some(status)) => {
                        debug!(server = %id, %status, "server process exited");
                        break;
                    }
                    Ok(None) => {}
                    Err(error) => {
                        warn!(server = %id, %error, "lost track of server process");
                        break;
                    }
                }
                tokio::time::sleep(CHILD_POLL_INTERVAL).await;
            }
            exited.store(true, Ordering::SeqCst);
            if !detached.load(Ordering::SeqCst) {
                let _ = exits.send(id);
            }
        });

        Ok(Box::new(handle))
    }
}
