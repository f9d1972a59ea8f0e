//! The broker-runtime boundary.
//!
//! The mediator lives inside a broker runtime that delivers client requests
//! to it and accepts answers back. Everything here is non-blocking: issuing
//! a call returns immediately, and the eventual reply is delivered through
//! the mediator's callback surface (`invoke_replied` / `bind_replied`),
//! correlated by the sub-request id the mediator chose when issuing.

use crate::objref::{Address, ObjRef};
use crate::request::{
    AddressingDisposition, Identity, InvokeStatus, LocateStatus, Payload, RequestId, SubRequestId,
};

/// Operations the broker runtime provides to the mediator.
pub trait Broker: Send + Sync {
    /// Answer a client invocation. On [`InvokeStatus::Forward`], `target`
    /// carries the reference the client should retry against; on
    /// [`InvokeStatus::SystemException`] the broker marshals the
    /// object-not-existing failure itself.
    fn answer_invoke(
        &self,
        id: RequestId,
        status: InvokeStatus,
        target: Option<ObjRef>,
        payload: Payload,
        disposition: AddressingDisposition,
    );

    /// Answer a client bind (broadcast locate) request.
    fn answer_bind(&self, id: RequestId, status: LocateStatus, target: Option<ObjRef>);

    /// Answer a client locate request.
    fn answer_locate(&self, id: RequestId, status: LocateStatus, target: Option<ObjRef>);

    /// Allocate a fresh id from the mediator's own sub-request id space.
    fn new_sub_request_id(&self) -> SubRequestId;

    /// Re-issue an invocation against `target` on a client's behalf. The
    /// reply arrives as an `invoke_replied(sub, ..)` callback.
    fn issue_invoke(
        &self,
        sub: SubRequestId,
        target: ObjRef,
        payload: Payload,
        identity: Option<Identity>,
        reply_expected: bool,
    );

    /// Issue one leg of a locate broadcast against a candidate server. The
    /// reply arrives as a `bind_replied(sub, ..)` callback.
    fn issue_bind(&self, sub: SubRequestId, interface_id: &str, tag: &[u8], target: &Address);

    /// Cancel an in-flight sub-request. Best-effort; a reply already in
    /// delivery may still arrive.
    fn cancel(&self, sub: SubRequestId);
}
