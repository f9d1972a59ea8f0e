//! Orbact Common Types and Interfaces
//!
//! This crate provides the shared vocabulary for the orbact activation
//! mediator: the error taxonomy, request/status types, the object-reference
//! model, and the interfaces of the two collaborators the mediator consumes
//! (the implementation repository and the broker runtime).
//!
//! # Overview
//!
//! Orbact mediates invocations addressed to remote objects whose owning
//! server process may not be running. Clients hold long-lived references;
//! the mediator intercepts calls on them, starts the owning server on
//! demand, queues work until the server announces readiness, and then
//! forwards or re-issues the call. This crate contains everything both the
//! mediator core and its embedders need to agree on:
//!
//! - **Errors**: [`OrbactError`] and the crate-wide [`Result`] alias
//! - **Requests**: request/sub-request id spaces and reply statuses
//! - **References**: [`ObjRef`], address templates, and object-key parsing
//! - **Repository**: the catalog of server launch definitions
//! - **Broker**: the runtime boundary for answering and re-issuing requests
//!
//! No wire format lives here: payloads, identities, and addresses are opaque
//! to the mediator and are produced/consumed by the broker runtime.

pub mod broker;
pub mod error;
pub mod objref;
pub mod repository;
pub mod request;

pub use broker::Broker;
pub use error::{OrbactError, Result};
pub use objref::{server_id_of_key, AddrTemplate, Address, ObjRef, ServerId};
pub use repository::{ActivationMode, ImplDef, MemoryRepository, Repository};
pub use request::{
    AddressingDisposition, Identity, InvokeStatus, LocateStatus, Payload, RequestId, SubRequestId,
};
