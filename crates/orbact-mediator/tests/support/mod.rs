//! Scripted collaborators for driving the mediator in tests: a broker that
//! records everything it is asked to do, and a spawner whose processes exit
//! exactly when told to.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use orbact_common::{
    AddrTemplate, Address, AddressingDisposition, Broker, Identity, InvokeStatus, LocateStatus,
    MemoryRepository, ObjRef, OrbactError, Payload, RequestId, Result, ServerId, SubRequestId,
};
use orbact_mediator::{
    ExitSender, LaunchRefs, Mediator, MediatorConfig, Process, ProcessSpawner,
};

#[derive(Debug, Clone)]
pub enum BrokerEvent {
    AnswerInvoke {
        id: RequestId,
        status: InvokeStatus,
        target: Option<ObjRef>,
    },
    AnswerBind {
        id: RequestId,
        status: LocateStatus,
        target: Option<ObjRef>,
    },
    AnswerLocate {
        id: RequestId,
        status: LocateStatus,
    },
    IssueInvoke {
        sub: SubRequestId,
        target: ObjRef,
        reply_expected: bool,
    },
    IssueBind {
        sub: SubRequestId,
        interface_id: String,
        target: Address,
    },
    Cancel {
        sub: SubRequestId,
    },
}

/// Broker fake that records every call.
#[derive(Default)]
pub struct RecordingBroker {
    next_sub: AtomicU64,
    events: Mutex<Vec<BrokerEvent>>,
}

impl RecordingBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn record(&self, event: BrokerEvent) {
        self.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<BrokerEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn answered_invokes(&self) -> Vec<(RequestId, InvokeStatus, Option<ObjRef>)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                BrokerEvent::AnswerInvoke { id, status, target } => Some((id, status, target)),
                _ => None,
            })
            .collect()
    }

    pub fn answered_binds(&self) -> Vec<(RequestId, LocateStatus, Option<ObjRef>)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                BrokerEvent::AnswerBind { id, status, target } => Some((id, status, target)),
                _ => None,
            })
            .collect()
    }

    pub fn issued_invokes(&self) -> Vec<(SubRequestId, ObjRef, bool)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                BrokerEvent::IssueInvoke {
                    sub,
                    target,
                    reply_expected,
                } => Some((sub, target, reply_expected)),
                _ => None,
            })
            .collect()
    }

    pub fn issued_binds(&self) -> Vec<(SubRequestId, String, Address)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                BrokerEvent::IssueBind {
                    sub,
                    interface_id,
                    target,
                } => Some((sub, interface_id, target)),
                _ => None,
            })
            .collect()
    }

    pub fn cancels(&self) -> Vec<SubRequestId> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                BrokerEvent::Cancel { sub } => Some(sub),
                _ => None,
            })
            .collect()
    }
}

impl Broker for RecordingBroker {
    fn answer_invoke(
        &self,
        id: RequestId,
        status: InvokeStatus,
        target: Option<ObjRef>,
        _payload: Payload,
        _disposition: AddressingDisposition,
    ) {
        self.record(BrokerEvent::AnswerInvoke { id, status, target });
    }

    fn answer_bind(&self, id: RequestId, status: LocateStatus, target: Option<ObjRef>) {
        self.record(BrokerEvent::AnswerBind { id, status, target });
    }

    fn answer_locate(&self, id: RequestId, status: LocateStatus, _target: Option<ObjRef>) {
        self.record(BrokerEvent::AnswerLocate { id, status });
    }

    fn new_sub_request_id(&self) -> SubRequestId {
        SubRequestId(1000 + self.next_sub.fetch_add(1, Ordering::SeqCst))
    }

    fn issue_invoke(
        &self,
        sub: SubRequestId,
        target: ObjRef,
        _payload: Payload,
        _identity: Option<Identity>,
        reply_expected: bool,
    ) {
        self.record(BrokerEvent::IssueInvoke {
            sub,
            target,
            reply_expected,
        });
    }

    fn issue_bind(&self, sub: SubRequestId, interface_id: &str, _tag: &[u8], target: &Address) {
        self.record(BrokerEvent::IssueBind {
            sub,
            interface_id: interface_id.to_string(),
            target: target.clone(),
        });
    }

    fn cancel(&self, sub: SubRequestId) {
        self.record(BrokerEvent::Cancel { sub });
    }
}

/// State of one scripted process generation.
pub struct ScriptedProcessState {
    id: ServerId,
    exits: ExitSender,
    exited: AtomicBool,
    detached: AtomicBool,
    terminated: AtomicBool,
    exit_on_terminate: bool,
}

impl ScriptedProcessState {
    /// Mark the process exited and deliver the exit event (unless detached).
    pub fn exit(&self) {
        if self.exited.swap(true, Ordering::SeqCst) {
            return;
        }
        if !self.detached.load(Ordering::SeqCst) {
            let _ = self.exits.send(self.id.clone());
        }
    }

    pub fn was_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }
}

struct ScriptedProcess(Arc<ScriptedProcessState>);

impl Process for ScriptedProcess {
    fn terminate(&self) {
        self.0.terminated.store(true, Ordering::SeqCst);
        if self.0.exit_on_terminate {
            self.0.exit();
        }
    }

    fn has_exited(&self) -> bool {
        self.0.exited.load(Ordering::SeqCst)
    }

    fn detach(&self) {
        self.0.detached.store(true, Ordering::SeqCst);
    }
}

/// Spawner fake. Processes exit when the test says so; `terminate` exits
/// them immediately unless the server is on the refuse-exit list.
#[derive(Default)]
pub struct ScriptedSpawner {
    spawned: Mutex<Vec<(ServerId, String)>>,
    fail_for: Mutex<HashSet<ServerId>>,
    refuse_exit: Mutex<HashSet<ServerId>>,
    processes: Mutex<HashMap<ServerId, Arc<ScriptedProcessState>>>,
}

impl ScriptedSpawner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_spawns_for(&self, id: &str) {
        self.fail_for.lock().unwrap().insert(id.to_string());
    }

    pub fn refuse_exit_for(&self, id: &str) {
        self.refuse_exit.lock().unwrap().insert(id.to_string());
    }

    pub fn spawn_count(&self, id: &str) -> usize {
        self.spawned
            .lock()
            .unwrap()
            .iter()
            .filter(|(spawned_id, _)| spawned_id == id)
            .count()
    }

    pub fn total_spawns(&self) -> usize {
        self.spawned.lock().unwrap().len()
    }

    /// Latest process generation spawned for `id`.
    pub fn process(&self, id: &str) -> Arc<ScriptedProcessState> {
        self.processes
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .unwrap_or_else(|| panic!("no process spawned for '{id}'"))
    }
}

impl ProcessSpawner for ScriptedSpawner {
    fn spawn(&self, id: &ServerId, command: &str, exits: ExitSender) -> Result<Box<dyn Process>> {
        if self.fail_for.lock().unwrap().contains(id) {
            return Err(OrbactError::StartFailure(format!("scripted failure for '{id}'")));
        }
        self.spawned
            .lock()
            .unwrap()
            .push((id.clone(), command.to_string()));
        let state = Arc::new(ScriptedProcessState {
            id: id.clone(),
            exits,
            exited: AtomicBool::new(false),
            detached: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
            exit_on_terminate: !self.refuse_exit.lock().unwrap().contains(id),
        });
        self.processes
            .lock()
            .unwrap()
            .insert(id.clone(), state.clone());
        Ok(Box::new(ScriptedProcess(state)))
    }
}

pub const MEDIATOR_REF: &str = "ref:mediator";

pub struct Rig {
    pub broker: Arc<RecordingBroker>,
    pub repository: Arc<MemoryRepository>,
    pub spawner: Arc<ScriptedSpawner>,
    pub mediator: Arc<Mediator>,
}

/// Rig with redirect mode off, so active-server invocations are observable
/// as issued sub-calls.
pub fn rig() -> Rig {
    rig_with(MediatorConfig {
        redirect: false,
        ..MediatorConfig::default()
    })
}

pub fn rig_with(config: MediatorConfig) -> Rig {
    let broker = RecordingBroker::new();
    let repository = Arc::new(MemoryRepository::new());
    let spawner = ScriptedSpawner::new();
    let mediator = Mediator::new(
        broker.clone(),
        repository.clone(),
        spawner.clone(),
        LaunchRefs {
            repository_ref: "ref:repo".into(),
            interface_repository_ref: None,
            mediator_ref: MEDIATOR_REF.into(),
        },
        config,
    );
    Rig {
        broker,
        repository,
        spawner,
        mediator,
    }
}

/// A reference addressed to the mediator, owned by `server`.
pub fn obj(server: &str, object: &str) -> ObjRef {
    ObjRef::new(
        Address::new(MEDIATOR_REF),
        format!("{server}/{object}").into_bytes(),
        object.as_bytes().to_vec(),
    )
}

pub fn template(addr: &str) -> AddrTemplate {
    AddrTemplate::new(Address::new(addr))
}

/// Let spawned tasks (the exit dispatcher in particular) run to quiescence.
/// Under a paused clock the sleep only completes once every runnable task
/// has gone idle.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
