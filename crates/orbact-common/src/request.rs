//! Request identifiers and reply statuses.
//!
//! Two distinct id spaces exist: [`RequestId`] identifies a client request as
//! assigned by the broker runtime, while [`SubRequestId`] identifies a call
//! the mediator issues on its own behalf (a re-issued invocation or one leg
//! of a locate broadcast). Keeping the spaces apart means a sub-request can
//! never be mistaken for the client request it serves.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a client request, assigned by the broker runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a sub-request issued by the mediator itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubRequestId(pub u64);

impl fmt::Display for SubRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Marshalled request or reply bytes. Opaque to the mediator.
pub type Payload = Vec<u8>;

/// Caller identity propagated alongside an invocation. Opaque to the mediator.
pub type Identity = String;

/// GIOP-style addressing disposition echoed back on invocation replies.
pub type AddressingDisposition = u16;

/// Outcome of an invocation as answered to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvokeStatus {
    /// The invocation completed; the payload carries the reply.
    Ok,
    /// The client should retry against the reference carried in the answer.
    Forward,
    /// The invocation failed with a system-level exception (for the
    /// mediator's purposes: object-not-existing).
    SystemException,
}

/// Outcome of a locate/bind query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocateStatus {
    /// No queried server hosts a matching object.
    Unknown,
    /// The answering server hosts the object.
    Here,
    /// The object lives elsewhere; the answer carries the forward reference.
    Forward,
}
