use std::sync::{Arc, Weak};

use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use orbact_common::{
    server_id_of_key, ActivationMode, AddrTemplate, Address, AddressingDisposition, Broker,
    Identity, ImplDef, InvokeStatus, LocateStatus, ObjRef, OrbactError, Payload, Repository,
    RequestId, Result, ServerId, SubRequestId,
};

use crate::config::MediatorConfig;
use crate::correlation::CorrelationMap;
use crate::process::{ExitReceiver, ProcessSpawner};
use crate::queue::{QueueEntry, RequestQueue};
use crate::registry::{RecordRef, Registry};
use crate::server::ServerState;
use crate::supervisor::{LaunchRefs, Supervisor};

/// The activation mediator.
///
/// Servers with on-demand activation publish references that point at the
/// mediator; the object key inside such a reference starts with the owning
/// server's id. When an invocation or a locate broadcast arrives for one of
/// those references, the mediator consults the server's record and either
/// serves the request right away (redirect or re-issue against the server's
/// advertised address), queues it until the server announces readiness, or
/// fails it when the server cannot be brought up.
///
/// # Surfaces
///
/// - **Object-adapter surface**, driven by the broker runtime:
///   [`has_object`](Self::has_object), [`invoke`](Self::invoke),
///   [`bind`](Self::bind), [`locate`](Self::locate),
///   [`cancel`](Self::cancel)
/// - **Administrative surface**, driven by servers and operators:
///   [`register_server`](Self::register_server),
///   [`activate`](Self::activate), [`deactivate`](Self::deactivate),
///   [`force_activate`](Self::force_activate), [`hold`](Self::hold),
///   [`stop`](Self::stop), [`resume`](Self::resume),
///   [`shutdown`](Self::shutdown)
/// - **Callback surface**, driven by replies to the mediator's own calls:
///   [`invoke_replied`](Self::invoke_replied),
///   [`bind_replied`](Self::bind_replied)
///
/// # Concurrency
///
/// Requests, replies, exit events, and administrative commands may arrive on
/// any task. The registry lock guards structural growth only; each server's
/// record has its own lock, held across a transition but never across a
/// queue replay; the correlation map's lock is a leaf. Process exits funnel
/// through one channel consumed by a single dispatcher task, so exit
/// handling is linearized no matter where the exits originate. The only
/// blocking operations are [`stop`](Self::stop) and
/// [`shutdown`](Self::shutdown), and they wait by yielding to the runtime,
/// so every other event keeps flowing while they poll.
pub struct Mediator {
    broker: Arc<dyn Broker>,
    repository: Arc<dyn Repository>,
    registry: Registry,
    queue: RequestQueue,
    correlations: CorrelationMap,
    supervisor: Supervisor,
    config: MediatorConfig,
    own_ref: String,
}

impl Mediator {
    /// Create the mediator and start its exit-event dispatcher.
    ///
    /// `refs.mediator_ref` doubles as the reference handed back to servers
    /// registering at connect time and as the callback reference passed to
    /// every launched process.
    pub fn new(
        broker: Arc<dyn Broker>,
        repository: Arc<dyn Repository>,
        spawner: Arc<dyn ProcessSpawner>,
        refs: LaunchRefs,
        config: MediatorConfig,
    ) -> Arc<Self> {
        let (exit_tx, exit_rx) = mpsc::unbounded_channel();
        let own_ref = refs.mediator_ref.clone();
        let supervisor = Supervisor::new(
            repository.clone(),
            spawner,
            exit_tx,
            refs,
            config.restart_backoff,
        );
        let mediator = Arc::new(Self {
            broker,
            repository,
            registry: Registry::new(),
            queue: RequestQueue::new(),
            correlations: CorrelationMap::new(),
            supervisor,
            config,
            own_ref,
        });
        Self::spawn_exit_dispatcher(Arc::downgrade(&mediator), exit_rx);
        mediator
    }

    fn spawn_exit_dispatcher(mediator: Weak<Self>, mut exits: ExitReceiver) {
        tokio::spawn(async move {
            while let Some(id) = exits.recv().await {
                match mediator.upgrade() {
                    Some(m) => m.process_exited(&id).await,
                    None => break,
                }
            }
        });
    }

    // ========================================================================
    // Administrative surface
    // ========================================================================

    /// A server connects and announces its reference template.
    ///
    /// Creates the repository entry if none exists (with an empty command:
    /// such a server is never started on demand) and stores the template the
    /// forwarder will rebuild references from. Returns the mediator's own
    /// reference for the server to embed in the references it publishes.
    pub async fn register_server(&self, id: &str, template: AddrTemplate) -> String {
        if self.repository.find_by_name(id).is_empty() {
            self.repository
                .create(ImplDef::new(id, "", ActivationMode::Mediated));
        }
        let rec = self.registry.get_or_create(id).await;
        rec.lock().await.template = Some(template);
        debug!(server = id, "server registered");
        self.own_ref.clone()
    }

    /// The server announces readiness: it becomes Active and queued work
    /// replays. Ignored in Stopped or Holding, where the administrative
    /// state takes precedence. The replay pass runs even when the queue is
    /// empty.
    pub async fn activate(&self, id: &str) {
        let rec = self.registry.get_or_create(id).await;
        let activated = { rec.lock().await.activate() };
        if !activated {
            debug!(server = id, "readiness announce ignored");
            return;
        }
        info!(server = id, "server active");
        self.replay_queue().await;
    }

    /// The server announces it is going away: Active becomes Inactive,
    /// Holding becomes Stopped, Stopped stays. The process handle is
    /// detached, so the exit of a deactivated server is not reported.
    pub async fn deactivate(&self, id: &str) {
        let rec = self.registry.get_or_create(id).await;
        rec.lock().await.deactivate();
        info!(server = id, "server deactivated");
    }

    /// Administratively start a server right now.
    ///
    /// A Failed record is reset first, so this bypasses the restart backoff.
    /// Holding becomes Active directly. A Stopped server whose process is
    /// still exiting cannot be activated and reports a failure.
    pub async fn force_activate(&self, id: &str) -> Result<()> {
        let rec = self.registry.get_or_create(id).await;
        let mut rec = rec.lock().await;
        match rec.state {
            ServerState::Started | ServerState::Active => return Ok(()),
            ServerState::Holding => {
                rec.state = ServerState::Active;
                return Ok(());
            }
            ServerState::Stopped => {
                if rec.has_live_process() {
                    warn!(server = id, "cannot activate: still waiting for server to exit");
                    return Err(OrbactError::StartFailure(format!(
                        "server '{id}' is stopped and still exiting"
                    )));
                }
                rec.state = ServerState::Inactive;
            }
            ServerState::Failed => {
                rec.state = ServerState::Inactive;
                rec.failed_at = None;
            }
            ServerState::Inactive => {}
        }
        self.supervisor.ensure_started(&mut rec)
    }

    /// Administrative pause: new invocations queue and no process is
    /// started. Idempotent; a Stopped server stays Stopped.
    pub async fn hold(&self, id: &str) {
        let rec = self.registry.get_or_create(id).await;
        rec.lock().await.hold();
        info!(server = id, "server holding");
    }

    /// Administrative shutdown of one server.
    ///
    /// Without a running process this is an immediate success. Otherwise the
    /// process is signalled, the record moves to Stopped, and the caller
    /// waits (bounded by `stop_timeout`, polling cooperatively) for the exit
    /// confirmation to clear the handle. On timeout a [`OrbactError::StopTimeout`]
    /// is reported and the record remains Stopped.
    pub async fn stop(&self, id: &str) -> Result<()> {
        let rec = self.registry.get_or_create(id).await;
        {
            let mut rec = rec.lock().await;
            match rec.state {
                ServerState::Inactive | ServerState::Failed | ServerState::Stopped => {
                    rec.state = ServerState::Stopped;
                    return Ok(());
                }
                ServerState::Started | ServerState::Active | ServerState::Holding => {
                    let Some(proc) = rec.process.as_ref() else {
                        panic!("stop: server '{id}' running without a process handle");
                    };
                    proc.terminate();
                    rec.state = ServerState::Stopped;
                }
            }
        }

        // The exit notification clears the handle; poll for that within the
        // bound while the runtime keeps delivering it.
        let deadline = Instant::now() + self.config.stop_timeout;
        loop {
            if rec.lock().await.process.is_none() {
                info!(server = id, "server stopped");
                return Ok(());
            }
            if Instant::now() >= deadline {
                warn!(server = id, "server did not exit within the stop bound");
                return Err(OrbactError::StopTimeout(id.to_string()));
            }
            sleep(self.config.poll_interval).await;
        }
    }

    /// Administrative continue: Failed, Stopped, or Holding move back to
    /// Inactive and queued work replays; the server itself is restarted
    /// lazily by the next invocation. Already-running states are untouched.
    pub async fn resume(&self, id: &str) {
        let rec = self.registry.get_or_create(id).await;
        let replay = { rec.lock().await.resume() };
        if replay {
            info!(server = id, "server resumed");
            self.replay_queue().await;
        }
    }

    /// Terminate every managed server and wait for the exits, bounded by
    /// `shutdown_timeout` across all servers. Queued work is failed first so
    /// no request outlives the mediator. Servers still running at the bound
    /// are reported and returned; no second, harder signal is sent.
    pub async fn shutdown(&self) -> Vec<ServerId> {
        self.fail_queue();

        for (_, rec) in self.registry.snapshot().await {
            let rec = rec.lock().await;
            if let Some(proc) = rec.process.as_ref() {
                proc.terminate();
            }
        }

        let deadline = Instant::now() + self.config.shutdown_timeout;
        loop {
            let mut waiting = Vec::new();
            for (id, rec) in self.registry.snapshot().await {
                let rec = rec.lock().await;
                if rec.has_live_process() {
                    waiting.push(id);
                }
            }
            if waiting.is_empty() {
                info!("all servers exited");
                return Vec::new();
            }
            if Instant::now() >= deadline {
                waiting.sort();
                for id in &waiting {
                    warn!(server = %id, "server still running at shutdown bound");
                }
                return waiting;
            }
            sleep(self.config.poll_interval).await;
        }
    }

    // ========================================================================
    // Object-adapter surface
    // ========================================================================

    /// Whether a reference belongs to a server this mediator mediates.
    ///
    /// A server id unknown to the registry but present in the repository
    /// gets a fresh Inactive record, so a later invocation restarts the
    /// server.
    pub async fn has_object(&self, target: &ObjRef) -> bool {
        let id = server_id_of_key(target.object_key());
        if id.is_empty() {
            return false;
        }
        if self.registry.contains(&id).await {
            return true;
        }
        if self.repository.find_by_name(&id).is_empty() {
            return false;
        }
        self.registry.get_or_create(&id).await;
        true
    }

    /// Mediate one invocation.
    ///
    /// The owning server id is the first path segment of the target's object
    /// key. Depending on the server's state the request is:
    ///
    /// - **answered not-existing** - id unknown to registry and repository,
    ///   or the server cannot be started (including an active restart
    ///   backoff)
    /// - **queued** - server Stopped or Holding (no process is started), or
    ///   starting and not yet Active
    /// - **served** - server Active: the reference is rebuilt against the
    ///   server's advertised template, then either answered as a redirect
    ///   (reply expected and redirect mode on) or re-issued asynchronously
    ///   with a correlation entry recorded for the eventual reply
    pub async fn invoke(
        &self,
        id: RequestId,
        target: ObjRef,
        payload: Payload,
        identity: Option<Identity>,
        reply_expected: bool,
    ) {
        let server_id = server_id_of_key(target.object_key());
        let rec_ref = match self.resolve_server(&server_id).await {
            Ok(rec) => rec,
            Err(error) => {
                debug!(request = %id, %error, "invocation failed");
                self.answer_not_exist(id);
                return;
            }
        };

        let mut rec = rec_ref.lock().await;
        match rec.state {
            ServerState::Stopped | ServerState::Holding => {
                drop(rec);
                self.queue.push(QueueEntry::Invocation {
                    id,
                    target,
                    payload,
                    identity,
                    reply_expected,
                });
            }
            ServerState::Active => {
                let Some(template) = rec.template.clone() else {
                    drop(rec);
                    warn!(server = %server_id, "active server never announced its template");
                    self.answer_not_exist(id);
                    return;
                };
                drop(rec);
                let remote = template.make_ref(&target.object_key, &target.object_id);
                if reply_expected && self.config.redirect {
                    self.broker
                        .answer_invoke(id, InvokeStatus::Forward, Some(remote), payload, 0);
                    return;
                }
                let sub = self.broker.new_sub_request_id();
                if reply_expected {
                    // recorded before the call goes out, so the reply cannot
                    // beat the entry
                    self.correlations.insert(sub, id);
                }
                self.broker
                    .issue_invoke(sub, remote, payload, identity, reply_expected);
            }
            ServerState::Inactive | ServerState::Started | ServerState::Failed => {
                match self.supervisor.ensure_started(&mut rec) {
                    Ok(()) => {
                        drop(rec);
                        // started but not ready; readiness is only declared
                        // by the server's own announce
                        self.queue.push(QueueEntry::Invocation {
                            id,
                            target,
                            payload,
                            identity,
                            reply_expected,
                        });
                    }
                    Err(error) => {
                        drop(rec);
                        debug!(server = %server_id, request = %id, %error, "invocation target cannot start");
                        self.answer_not_exist(id);
                    }
                }
            }
        }
    }

    /// Broadcast locate: find which activation-managed server hosts an
    /// object of `interface_id` matching `tag`.
    ///
    /// Returns `false` when the request is declined (a non-local constraint,
    /// or no candidate serves the interface) so the broker can try other
    /// adapters. Otherwise every candidate that can start is started; if any
    /// had to be, the whole broadcast queues as one unit until readiness.
    /// Once all candidates are settled, one leg goes to each Active
    /// candidate, with every leg's correlation entry registered before any
    /// leg is issued so an early reply cannot race a missing entry.
    pub async fn bind(
        &self,
        id: RequestId,
        interface_id: &str,
        tag: &[u8],
        constraint: Option<&Address>,
    ) -> bool {
        if let Some(addr) = constraint {
            if !addr.is_local() {
                return false;
            }
        }

        let candidates: Vec<ImplDef> = self
            .repository
            .find_by_interface_tag(interface_id, tag)
            .into_iter()
            .filter(|d| d.mode() == ActivationMode::Mediated)
            .collect();
        if candidates.is_empty() {
            return false;
        }

        let mut pending_start = false;
        for def in &candidates {
            let rec = self.registry.get_or_create(def.name()).await;
            let mut rec = rec.lock().await;
            if !matches!(
                rec.state,
                ServerState::Active | ServerState::Stopped | ServerState::Holding
            ) {
                if let Err(error) = self.supervisor.ensure_started(&mut rec) {
                    drop(rec);
                    warn!(
                        interface = interface_id,
                        server = def.name(),
                        %error,
                        "bind aborted: candidate cannot start"
                    );
                    self.broker.answer_bind(id, LocateStatus::Unknown, None);
                    return true;
                }
                pending_start = true;
            }
        }
        if pending_start {
            self.queue.push(QueueEntry::Broadcast {
                id,
                interface_id: interface_id.to_string(),
                tag: tag.to_vec(),
            });
            return true;
        }

        let mut legs: Vec<(SubRequestId, Address)> = Vec::new();
        for def in &candidates {
            let rec = self.registry.get_or_create(def.name()).await;
            let rec = rec.lock().await;
            if rec.state != ServerState::Active {
                continue;
            }
            let Some(template) = rec.template.as_ref() else {
                warn!(server = def.name(), "active candidate never announced its template");
                continue;
            };
            let sub = self.broker.new_sub_request_id();
            self.correlations.insert(sub, id);
            legs.push((sub, template.address().clone()));
        }

        if legs.is_empty() {
            // every candidate is administratively stopped or holding: the
            // broadcast can never be answered, so fail it instead of hanging
            self.broker.answer_bind(id, LocateStatus::Unknown, None);
            return true;
        }
        for (sub, addr) in legs {
            self.broker.issue_bind(sub, interface_id, tag, &addr);
        }
        true
    }

    /// Locate addressed to the mediator itself: the object is (nominally)
    /// here; the real forward happens on the follow-up invocation.
    pub fn locate(&self, id: RequestId) {
        self.broker.answer_locate(id, LocateStatus::Here, None);
    }

    /// Cancel every sub-request serving `id`, one broker cancel per
    /// correlation entry removed.
    pub fn cancel(&self, id: RequestId) {
        for sub in self.correlations.remove_all_for(id) {
            self.broker.cancel(sub);
        }
    }

    // ========================================================================
    // Callback surface
    // ========================================================================

    /// A re-issued invocation completed: route the reply to the original
    /// caller and drop the correlation entry.
    ///
    /// # Panics
    ///
    /// On a sub-request id with no entry: replies only arrive for calls the
    /// mediator issued with a correlation entry, so a miss is a logic
    /// defect.
    pub fn invoke_replied(
        &self,
        sub: SubRequestId,
        status: InvokeStatus,
        target: Option<ObjRef>,
        payload: Payload,
        disposition: AddressingDisposition,
    ) {
        let Some(id) = self.correlations.remove(sub) else {
            panic!("invoke reply for unknown sub-request {sub}");
        };
        self.broker
            .answer_invoke(id, status, target, payload, disposition);
    }

    /// One leg of a locate broadcast answered.
    ///
    /// First positive reply wins: it answers the original request and
    /// cancels the sibling legs. A negative reply answers only when it is
    /// the last leg standing. A reply whose entry is already gone belongs to
    /// a broadcast answered earlier; the stale sub-call is cancelled
    /// best-effort and the reply ignored.
    pub fn bind_replied(&self, sub: SubRequestId, status: LocateStatus, target: Option<ObjRef>) {
        let Some(id) = self.correlations.remove(sub) else {
            self.broker.cancel(sub);
            return;
        };
        if status == LocateStatus::Here {
            self.broker.answer_bind(id, status, target);
            self.cancel(id);
        } else if !self.correlations.has_any_for(id) {
            self.broker.answer_bind(id, status, target);
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Exit-event handler; sole caller is the dispatcher task, so exits are
    /// handled one at a time.
    async fn process_exited(&self, id: &str) {
        let Some(rec_ref) = self.registry.get(id).await else {
            panic!("exit event for unknown server '{id}'");
        };
        let state = { rec_ref.lock().await.on_process_exit(Instant::now()) };
        match state {
            ServerState::Failed => {
                error!(server = id, "server exited before announcing readiness");
                // replay so pending requests observe the failure instead of
                // hanging
                self.replay_queue().await;
            }
            state => debug!(server = id, %state, "server process exited"),
        }
    }

    /// Drain the queue and re-run every entry in arrival order against
    /// current server state. Entries that still cannot be served re-enqueue
    /// themselves through the normal paths; entries whose server is now
    /// unreachable (Failed inside backoff, or gone) are answered with the
    /// failure. Never called with a record lock held.
    async fn replay_queue(&self) {
        let entries = self.queue.drain();
        if entries.is_empty() {
            return;
        }
        debug!(count = entries.len(), "replaying deferred requests");
        for entry in entries {
            match entry {
                QueueEntry::Invocation {
                    id,
                    target,
                    payload,
                    identity,
                    reply_expected,
                } => {
                    self.invoke(id, target, payload, identity, reply_expected)
                        .await;
                }
                QueueEntry::Broadcast {
                    id,
                    interface_id,
                    tag,
                } => {
                    // a queued broadcast was accepted once; a decline on
                    // replay means the candidates vanished
                    if !self.bind(id, &interface_id, &tag, None).await {
                        self.broker.answer_bind(id, LocateStatus::Unknown, None);
                    }
                }
            }
        }
    }

    /// Fail everything still queued with the not-found answer.
    fn fail_queue(&self) {
        for entry in self.queue.drain() {
            match entry {
                QueueEntry::Invocation { id, .. } => self.answer_not_exist(id),
                QueueEntry::Broadcast { id, .. } => {
                    self.broker.answer_bind(id, LocateStatus::Unknown, None)
                }
            }
        }
    }

    /// Record for `id`, recreating it from the repository when needed. A
    /// server known to neither is not reachable through this mediator.
    async fn resolve_server(&self, id: &str) -> Result<RecordRef> {
        if let Some(rec) = self.registry.get(id).await {
            return Ok(rec);
        }
        if id.is_empty() || self.repository.find_by_name(id).is_empty() {
            return Err(OrbactError::NotReachable(id.to_string()));
        }
        Ok(self.registry.get_or_create(id).await)
    }

    fn answer_not_exist(&self, id: RequestId) {
        self.broker
            .answer_invoke(id, InvokeStatus::SystemException, None, Payload::default(), 0);
    }
}
