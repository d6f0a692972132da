//! The kernel boundary.
//!
//! [`Kernel`] ties the registry, the execution pool and the merge
//! coordinator together behind a blocking API. Gate calls are
//! fire-and-forget; `measure` and `snapshot` block until the owning actor
//! replies.
//!
//! Every method blocks the calling thread on tokio primitives and must not
//! be called from inside an async task; use `tokio::task::spawn_blocking`
//! there.

use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tracing::{Span, debug, info, instrument};

use crate::actor::{ActorSettings, Command, GroupActor};
use crate::config::KernelConfig;
use crate::error::{KernelError, KernelResult};
use crate::gates::GateMatrix;
use crate::group::{Group, Snapshot, distinct};
use crate::merge::{self, MergeOutcome};
use crate::pool::{ContextId, ExecutionPool};
use crate::registry::{GroupHandle, GroupId, QubitKey, Registry};

static INSTANCE: Mutex<Option<Arc<Kernel>>> = Mutex::new(None);

fn instance() -> MutexGuard<'static, Option<Arc<Kernel>>> {
    INSTANCE.lock().unwrap_or_else(PoisonError::into_inner)
}

/// An entangled-qubit simulation kernel.
#[derive(Debug)]
pub struct Kernel {
    config: KernelConfig,
    registry: Registry,
    pool: ExecutionPool,
    next_group: AtomicU64,
    closed: AtomicBool,
}

impl Kernel {
    /// Start a standalone kernel, independent of the process-wide instance.
    pub fn new(config: KernelConfig) -> KernelResult<Self> {
        config.validate()?;
        let pool = ExecutionPool::start(config.workers)?;
        info!(
            workers = pool.size(),
            seed = ?config.seed,
            renormalize_every = config.renormalize_every,
            "kernel started"
        );
        Ok(Self {
            config,
            registry: Registry::new(),
            pool,
            next_group: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        })
    }

    /// Start the process-wide kernel.
    ///
    /// Fails with `AlreadyInitialized` while a previous instance is live.
    pub fn init(config: KernelConfig) -> KernelResult<Arc<Kernel>> {
        let mut slot = instance();
        if slot.is_some() {
            return Err(KernelError::AlreadyInitialized);
        }
        let kernel = Arc::new(Kernel::new(config)?);
        *slot = Some(Arc::clone(&kernel));
        Ok(kernel)
    }

    /// Return the process-wide kernel, starting one from the environment
    /// (see [`KernelConfig::from_env`]) if none is live.
    pub fn get_or_create() -> KernelResult<Arc<Kernel>> {
        let mut slot = instance();
        if let Some(kernel) = slot.as_ref() {
            return Ok(Arc::clone(kernel));
        }
        let kernel = Arc::new(Kernel::new(KernelConfig::from_env())?);
        *slot = Some(Arc::clone(&kernel));
        Ok(kernel)
    }

    /// The configuration the kernel was started with.
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Whether [`Kernel::shutdown`] has run.
    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> KernelResult<()> {
        if self.is_shut_down() {
            Err(KernelError::ShutDown)
        } else {
            Ok(())
        }
    }

    fn settings(&self) -> ActorSettings {
        ActorSettings {
            seed: self.config.seed,
            renormalize_every: self.config.renormalize_every,
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Register a new qubit in state |0⟩ on the next execution context.
    #[instrument(skip_all, fields(qubit = tracing::field::Empty))]
    pub fn create(&self, key: impl Into<QubitKey>) -> KernelResult<()> {
        self.ensure_open()?;
        let key = key.into();
        Span::current().record("qubit", key.as_str());

        let mut writer = self.registry.write();
        // shutdown may have drained the registry while we waited
        self.ensure_open()?;
        if writer.contains(&key) {
            return Err(KernelError::DuplicateKey(key));
        }

        let id = GroupId(self.next_group.fetch_add(1, Ordering::Relaxed));
        let context = self.pool.pick();
        let (tx, rx) = mpsc::unbounded_channel();
        let actor = GroupActor::new(id, Group::new(key.clone()), rx, self.settings());
        self.pool.host(context, actor)?;
        writer.register(key, GroupHandle::new(id, context, tx))?;

        debug!(group = %id, %context, "qubit created");
        Ok(())
    }

    /// Stop every actor and execution context. Idempotent.
    ///
    /// Afterwards every operation fails with `ShutDown`. If this is the
    /// process-wide instance, a new one may be initialized.
    #[instrument(skip_all)]
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let handles = self.registry.write().drain();
        let groups = handles.len();
        for handle in handles {
            let _ = handle.send(Command::Stop);
        }
        self.pool.shutdown();
        self.release_instance();
        info!(groups, "kernel shut down");
    }

    fn release_instance(&self) {
        let released = {
            let mut slot = instance();
            match slot.as_ref() {
                Some(kernel) if std::ptr::eq(Arc::as_ptr(kernel), self) => slot.take(),
                _ => None,
            }
        };
        drop(released);
    }

    // =========================================================================
    // Gate application
    // =========================================================================

    /// Apply a 2x2 matrix to `key`.
    pub fn apply_gate(&self, key: impl Into<QubitKey>, gate: GateMatrix) -> KernelResult<()> {
        self.ensure_open()?;
        gate.expect_dim("apply_gate", 2)?;
        let key = key.into();
        self.registry.dispatch(&key, || Command::SingleGate {
            key: key.clone(),
            gate,
        })?;
        Ok(())
    }

    /// Apply a 2x2 matrix to `target` conditioned on `control`, merging the
    /// two groups first if needed. `target` plays the sending side.
    ///
    /// The merge and the enqueue happen in one registry section: if another
    /// thread removes an operand first, the call fails with `UnknownQubit`
    /// and no other qubit is affected.
    pub fn apply_controlled_gate(
        &self,
        target: impl Into<QubitKey>,
        control: impl Into<QubitKey>,
        gate: GateMatrix,
    ) -> KernelResult<()> {
        self.ensure_open()?;
        gate.expect_dim("apply_controlled_gate", 2)?;
        let (target, control) = (target.into(), control.into());
        distinct(&[&target, &control])?;

        let command = Command::ControlledGate {
            target: target.clone(),
            control: control.clone(),
            gate,
        };
        merge::merge_and_dispatch(
            &self.registry,
            &[(&target, &control)],
            &[target.clone(), control.clone()],
            command,
        )
    }

    /// Apply a 4x4 matrix to `(first, second)`, `first` being the more
    /// significant operand.
    pub fn apply_two_qubit_gate(
        &self,
        first: impl Into<QubitKey>,
        second: impl Into<QubitKey>,
        gate: GateMatrix,
    ) -> KernelResult<()> {
        self.ensure_open()?;
        gate.expect_dim("apply_two_qubit_gate", 4)?;
        let (first, second) = (first.into(), second.into());
        distinct(&[&first, &second])?;

        let command = Command::TwoQubitGate {
            first: first.clone(),
            second: second.clone(),
            gate,
        };
        merge::merge_and_dispatch(
            &self.registry,
            &[(&first, &second)],
            &[first.clone(), second.clone()],
            command,
        )
    }

    /// Apply a two-qubit operation to `(first, second)` when `control` is |1⟩.
    ///
    /// `gate` is either the 4x4 operation itself or the full 8x8 block
    /// operator on `(control, first, second)`.
    pub fn apply_controlled_two_qubit_gate(
        &self,
        control: impl Into<QubitKey>,
        first: impl Into<QubitKey>,
        second: impl Into<QubitKey>,
        gate: GateMatrix,
    ) -> KernelResult<()> {
        self.ensure_open()?;
        if gate.dim() == 4 {
            gate.expect_dim("apply_controlled_two_qubit_gate", 4)?;
        } else {
            gate.expect_dim("apply_controlled_two_qubit_gate", 8)?;
        }
        let gate = gate.into_controlled_block();
        let (control, first, second) = (control.into(), first.into(), second.into());
        distinct(&[&control, &first, &second])?;

        let command = Command::ControlledTwoQubitGate {
            control: control.clone(),
            first: first.clone(),
            second: second.clone(),
            gate,
        };
        merge::merge_and_dispatch(
            &self.registry,
            &[(&control, &first), (&control, &second)],
            &[control.clone(), first.clone(), second.clone()],
            command,
        )
    }

    // =========================================================================
    // Measurement and inspection
    // =========================================================================

    /// Measure `key` in the computational basis and block for the outcome.
    ///
    /// A destructive measurement removes the key: it is unregistered before
    /// the outcome arrives and may be created again afterwards.
    #[instrument(skip_all, fields(qubit = tracing::field::Empty, destructive = destructive))]
    pub fn measure(&self, key: impl Into<QubitKey>, destructive: bool) -> KernelResult<u8> {
        self.ensure_open()?;
        let key = key.into();
        Span::current().record("qubit", key.as_str());

        let (reply, outcome) = oneshot::channel();
        let command = Command::Measure {
            key: key.clone(),
            destructive,
            reply,
        };
        if destructive {
            let mut writer = self.registry.write();
            let handle = writer.lookup(&key)?;
            if handle.send(command).is_err() {
                writer.purge(handle.id());
                return Err(KernelError::ActorTerminated(key));
            }
            let release = writer.unregister(&key)?;
            debug!(group = %handle.id(), ?release, "qubit removed");
        } else {
            self.registry.dispatch(&key, || command)?;
        }

        let bit = outcome
            .blocking_recv()
            .map_err(|_| KernelError::ActorTerminated(key))?;
        debug!(outcome = bit, "measured");
        Ok(bit)
    }

    /// Copy of the order and state vector of the group owning `key`.
    pub fn snapshot(&self, key: impl Into<QubitKey>) -> KernelResult<Snapshot> {
        self.ensure_open()?;
        let key = key.into();
        let (reply, snapshot) = oneshot::channel();
        self.registry.dispatch(&key, || Command::Snapshot { reply })?;
        snapshot
            .blocking_recv()
            .map_err(|_| KernelError::ActorTerminated(key))
    }

    /// Join the groups owning `sender` and `acceptor`.
    #[instrument(skip_all, fields(sender = tracing::field::Empty, acceptor = tracing::field::Empty))]
    pub fn merge(
        &self,
        sender: impl Into<QubitKey>,
        acceptor: impl Into<QubitKey>,
    ) -> KernelResult<MergeOutcome> {
        self.ensure_open()?;
        let (sender, acceptor) = (sender.into(), acceptor.into());
        let span = Span::current();
        span.record("sender", sender.as_str());
        span.record("acceptor", acceptor.as_str());
        merge::merge(&self.registry, &sender, &acceptor)
    }

    /// Whether `key` is live.
    pub fn contains(&self, key: impl Into<QubitKey>) -> bool {
        self.registry.contains(&key.into())
    }

    /// Number of live qubits.
    pub fn live_qubits(&self) -> usize {
        self.registry.len()
    }

    /// Number of live groups.
    pub fn live_groups(&self) -> usize {
        self.registry.group_count()
    }

    /// Live qubits hosted by each execution context.
    pub fn context_load(&self) -> FxHashMap<ContextId, usize> {
        self.registry.context_load()
    }

    // =========================================================================
    // Named gates
    // =========================================================================

    /// Pauli X on `key`.
    pub fn x_gate(&self, key: impl Into<QubitKey>) -> KernelResult<()> {
        self.apply_gate(key, GateMatrix::x())
    }

    /// Pauli Y on `key`.
    pub fn y_gate(&self, key: impl Into<QubitKey>) -> KernelResult<()> {
        self.apply_gate(key, GateMatrix::y())
    }

    /// Pauli Z on `key`.
    pub fn z_gate(&self, key: impl Into<QubitKey>) -> KernelResult<()> {
        self.apply_gate(key, GateMatrix::z())
    }

    /// Hadamard on `key`.
    pub fn h_gate(&self, key: impl Into<QubitKey>) -> KernelResult<()> {
        self.apply_gate(key, GateMatrix::h())
    }

    /// S on `key`.
    pub fn s_gate(&self, key: impl Into<QubitKey>) -> KernelResult<()> {
        self.apply_gate(key, GateMatrix::s())
    }

    /// T on `key`.
    pub fn t_gate(&self, key: impl Into<QubitKey>) -> KernelResult<()> {
        self.apply_gate(key, GateMatrix::t())
    }

    pub fn rx_gate(&self, key: impl Into<QubitKey>, theta: f64) -> KernelResult<()> {
        self.apply_gate(key, GateMatrix::rx(theta))
    }

    pub fn ry_gate(&self, key: impl Into<QubitKey>, theta: f64) -> KernelResult<()> {
        self.apply_gate(key, GateMatrix::ry(theta))
    }

    pub fn rz_gate(&self, key: impl Into<QubitKey>, theta: f64) -> KernelResult<()> {
        self.apply_gate(key, GateMatrix::rz(theta))
    }

    /// Controlled-X flipping `target` when `control` is |1⟩.
    pub fn cnot_gate(
        &self,
        target: impl Into<QubitKey>,
        control: impl Into<QubitKey>,
    ) -> KernelResult<()> {
        self.apply_controlled_gate(target, control, GateMatrix::x())
    }

    /// Controlled-Z.
    pub fn cphase_gate(
        &self,
        target: impl Into<QubitKey>,
        control: impl Into<QubitKey>,
    ) -> KernelResult<()> {
        self.apply_controlled_gate(target, control, GateMatrix::z())
    }

    pub fn swap_gate(&self, a: impl Into<QubitKey>, b: impl Into<QubitKey>) -> KernelResult<()> {
        self.apply_two_qubit_gate(a, b, GateMatrix::swap())
    }

    /// Alias of [`Kernel::apply_gate`].
    pub fn custom_gate(&self, key: impl Into<QubitKey>, gate: GateMatrix) -> KernelResult<()> {
        self.apply_gate(key, gate)
    }

    /// Alias of [`Kernel::apply_controlled_gate`].
    pub fn custom_controlled_gate(
        &self,
        target: impl Into<QubitKey>,
        control: impl Into<QubitKey>,
        gate: GateMatrix,
    ) -> KernelResult<()> {
        self.apply_controlled_gate(target, control, gate)
    }

    /// Alias of [`Kernel::apply_two_qubit_gate`].
    pub fn custom_two_qubit_gate(
        &self,
        first: impl Into<QubitKey>,
        second: impl Into<QubitKey>,
        gate: GateMatrix,
    ) -> KernelResult<()> {
        self.apply_two_qubit_gate(first, second, gate)
    }

    /// Alias of [`Kernel::apply_controlled_two_qubit_gate`].
    pub fn custom_controlled_two_qubit_gate(
        &self,
        control: impl Into<QubitKey>,
        first: impl Into<QubitKey>,
        second: impl Into<QubitKey>,
        gate: GateMatrix,
    ) -> KernelResult<()> {
        self.apply_controlled_two_qubit_gate(control, first, second, gate)
    }
}

impl Drop for Kernel {
    fn drop(&mut self) {
        self.shutdown();
    }
}
