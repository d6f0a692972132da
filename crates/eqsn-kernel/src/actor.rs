//! Group actors.
//!
//! Each actor owns one [`Group`] and drains its command channel one message
//! at a time. Commands for the same group therefore never run concurrently,
//! and the state vector needs no lock.

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, trace, warn};

use crate::error::{KernelError, KernelResult};
use crate::gates::GateMatrix;
use crate::group::{Group, Snapshot};
use crate::registry::{GroupId, QubitKey};

/// Messages accepted by a group actor.
pub(crate) enum Command {
    SingleGate {
        key: QubitKey,
        gate: GateMatrix,
    },
    ControlledGate {
        target: QubitKey,
        control: QubitKey,
        gate: GateMatrix,
    },
    TwoQubitGate {
        first: QubitKey,
        second: QubitKey,
        gate: GateMatrix,
    },
    ControlledTwoQubitGate {
        control: QubitKey,
        first: QubitKey,
        second: QubitKey,
        gate: GateMatrix,
    },
    Measure {
        key: QubitKey,
        destructive: bool,
        reply: oneshot::Sender<u8>,
    },
    /// Move the whole group into `transfer` and terminate.
    MergeSend {
        transfer: oneshot::Sender<Group>,
    },
    /// Wait for a group on `transfer`, absorb it, and report the keys gained.
    MergeAccept {
        transfer: oneshot::Receiver<Group>,
        reply: oneshot::Sender<Vec<QubitKey>>,
    },
    Snapshot {
        reply: oneshot::Sender<Snapshot>,
    },
    Stop,
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::SingleGate { .. } => "single_gate",
            Command::ControlledGate { .. } => "controlled_gate",
            Command::TwoQubitGate { .. } => "two_qubit_gate",
            Command::ControlledTwoQubitGate { .. } => "controlled_two_qubit_gate",
            Command::Measure { .. } => "measure",
            Command::MergeSend { .. } => "merge_send",
            Command::MergeAccept { .. } => "merge_accept",
            Command::Snapshot { .. } => "snapshot",
            Command::Stop => "stop",
        }
    }
}

/// Lifecycle of an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ActorState {
    /// Processing commands.
    Active,
    /// Group handed to a merge partner; exiting.
    Draining,
    /// Command loop has exited.
    Terminated,
}

/// Why an actor's command loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Received `Stop`.
    Stopped,
    /// Last qubit measured destructively.
    Emptied,
    /// Group moved into another actor.
    Merged,
    /// Every sender dropped.
    Disconnected,
    /// A command could not be executed.
    Failed,
}

/// Per-actor settings derived from the kernel configuration.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ActorSettings {
    pub seed: Option<u64>,
    pub renormalize_every: u32,
}

enum Flow {
    Continue,
    Exit(ExitReason),
}

pub(crate) struct GroupActor {
    id: GroupId,
    group: Option<Group>,
    inbox: mpsc::UnboundedReceiver<Command>,
    rng: StdRng,
    state: ActorState,
    renormalize_every: u32,
    gates_since_renormalize: u32,
}

impl GroupActor {
    pub(crate) fn new(
        id: GroupId,
        group: Group,
        inbox: mpsc::UnboundedReceiver<Command>,
        settings: ActorSettings,
    ) -> Self {
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed ^ id.0.wrapping_mul(0x9E37_79B9_7F4A_7C15)),
            None => StdRng::from_entropy(),
        };
        Self {
            id,
            group: Some(group),
            inbox,
            rng,
            state: ActorState::Active,
            renormalize_every: settings.renormalize_every,
            gates_since_renormalize: 0,
        }
    }

    pub(crate) fn id(&self) -> GroupId {
        self.id
    }

    /// Run the command loop to completion.
    pub(crate) async fn run(mut self) -> (GroupId, ExitReason) {
        debug!(group = %self.id, "actor started");
        let mut reason = ExitReason::Disconnected;
        while let Some(command) = self.inbox.recv().await {
            trace!(group = %self.id, command = command.name(), "execute");
            match self.handle(command).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Exit(why)) => {
                    reason = why;
                    break;
                }
                Err(err) => {
                    error!(group = %self.id, %err, "actor terminated abnormally");
                    reason = ExitReason::Failed;
                    break;
                }
            }
        }
        self.inbox.close();
        self.state = ActorState::Terminated;
        debug!(group = %self.id, ?reason, state = ?self.state, "actor exited");
        (self.id, reason)
    }

    async fn handle(&mut self, command: Command) -> KernelResult<Flow> {
        match command {
            Command::SingleGate { key, gate } => {
                self.group_mut()?.apply_single_gate(&gate, &key)?;
                self.after_gate();
            }
            Command::ControlledGate {
                target,
                control,
                gate,
            } => {
                self.group_mut()?
                    .apply_controlled_gate(&gate, &target, &control)?;
                self.after_gate();
            }
            Command::TwoQubitGate {
                first,
                second,
                gate,
            } => {
                self.group_mut()?
                    .apply_two_qubit_gate(&gate, &first, &second)?;
                self.after_gate();
            }
            Command::ControlledTwoQubitGate {
                control,
                first,
                second,
                gate,
            } => {
                self.group_mut()?
                    .apply_controlled_two_qubit_gate(&gate, &control, &first, &second)?;
                self.after_gate();
            }
            Command::Measure {
                key,
                destructive,
                reply,
            } => {
                let group = self.group.as_mut().ok_or_else(|| moved(self.id))?;
                let outcome = group.measure(&key, destructive, &mut self.rng)?;
                let emptied = group.is_empty();
                if reply.send(outcome).is_err() {
                    warn!(group = %self.id, qubit = %key, "measurement caller went away");
                }
                if emptied {
                    return Ok(Flow::Exit(ExitReason::Emptied));
                }
            }
            Command::MergeSend { transfer } => {
                let group = self.group.take().ok_or_else(|| moved(self.id))?;
                self.state = ActorState::Draining;
                debug!(group = %self.id, qubits = group.num_qubits(), state = ?self.state, "sending group to merge partner");
                if transfer.send(group).is_err() {
                    warn!(group = %self.id, "merge partner went away, state dropped");
                }
                return Ok(Flow::Exit(ExitReason::Merged));
            }
            Command::MergeAccept { transfer, reply } => match transfer.await {
                Ok(incoming) => {
                    let gained = incoming.order().to_vec();
                    let id = self.id;
                    let group = self.group_mut()?;
                    group.absorb(incoming);
                    debug!(group = %id, qubits = group.num_qubits(), "absorbed merge partner");
                    if reply.send(gained).is_err() {
                        warn!(group = %self.id, "merge coordinator went away");
                    }
                }
                Err(_) => {
                    warn!(group = %self.id, "merge sender terminated before transfer, nothing absorbed");
                }
            },
            Command::Snapshot { reply } => {
                let snapshot = self.group.as_ref().ok_or_else(|| moved(self.id))?.snapshot();
                let _ = reply.send(snapshot);
            }
            Command::Stop => return Ok(Flow::Exit(ExitReason::Stopped)),
        }
        Ok(Flow::Continue)
    }

    fn group_mut(&mut self) -> KernelResult<&mut Group> {
        let id = self.id;
        self.group.as_mut().ok_or_else(|| moved(id))
    }

    fn after_gate(&mut self) {
        if self.renormalize_every == 0 {
            return;
        }
        self.gates_since_renormalize += 1;
        if self.gates_since_renormalize >= self.renormalize_every {
            self.gates_since_renormalize = 0;
            if let Some(group) = self.group.as_mut() {
                let drift = (group.renormalize() - 1.0).abs();
                trace!(group = %self.id, drift, "renormalized");
            }
        }
    }
}

fn moved(id: GroupId) -> KernelError {
    KernelError::InvalidCommand(format!("{id} has already handed its state to a merge partner"))
}
