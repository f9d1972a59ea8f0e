//! Orbact Activation Mediator
//!
//! The mediator fields invocations and locate broadcasts addressed to
//! objects whose owning server process may not be running. It lazily starts
//! the owning server, queues requests until the server announces readiness,
//! then forwards or re-issues them, and supervises the spawned processes
//! (graceful stop with bounded wait, crash detection, restart backoff).
//!
//! # Components
//!
//! - [`registry`] - Concurrent store of per-server records
//! - [`server`] - The six-state per-server lifecycle
//! - [`supervisor`] - On-demand process start and crash backoff
//! - [`process`] - The process-spawn primitive and its local implementation
//! - [`queue`] - FIFO of deferred invocations and broadcasts
//! - [`correlation`] - Sub-request to originating-request tracking
//! - [`mediator`] - The hub tying everything together

pub mod config;
pub mod correlation;
pub mod mediator;
pub mod process;
pub mod queue;
pub mod registry;
pub mod server;
pub mod supervisor;

pub use config::MediatorConfig;
pub use correlation::CorrelationMap;
pub use mediator::Mediator;
pub use process::{ExitReceiver, ExitSender, LocalSpawner, Process, ProcessSpawner};
pub use queue::{QueueEntry, RequestQueue};
pub use registry::Registry;
pub use server::{ServerRecord, ServerState};
pub use supervisor::{LaunchRefs, Supervisor};
