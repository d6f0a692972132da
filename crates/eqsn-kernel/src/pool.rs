//! Execution-context pool.
//!
//! A fixed set of OS threads, each driving a single-threaded tokio runtime
//! that hosts any number of group actors. New groups are placed round-robin;
//! placement only spreads load and is never used for routing.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, trace, warn};

use crate::actor::{ExitReason, GroupActor};
use crate::error::{KernelError, KernelResult};
use crate::registry::GroupId;

/// Index of an execution context within the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContextId(pub usize);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

enum ContextMessage {
    Host(GroupActor),
    Close,
}

struct ContextSlot {
    id: ContextId,
    inbox: mpsc::UnboundedSender<ContextMessage>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

/// Fixed-size pool of execution contexts.
pub struct ExecutionPool {
    contexts: Vec<ContextSlot>,
    next: AtomicUsize,
    closed: AtomicBool,
}

impl ExecutionPool {
    /// Start `size` execution contexts (at least one).
    pub fn start(size: usize) -> KernelResult<Self> {
        let size = size.max(1);
        let mut contexts = Vec::with_capacity(size);
        for index in 0..size {
            let id = ContextId(index);
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            let (tx, rx) = mpsc::unbounded_channel();
            let thread = std::thread::Builder::new()
                .name(format!("eqsn-{id}"))
                .spawn(move || runtime.block_on(serve(id, rx)))?;
            contexts.push(ContextSlot {
                id,
                inbox: tx,
                thread: Mutex::new(Some(thread)),
            });
        }
        debug!(size, "execution pool started");
        Ok(Self {
            contexts,
            next: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        })
    }

    /// Number of execution contexts.
    pub fn size(&self) -> usize {
        self.contexts.len()
    }

    /// Next context in round-robin order.
    pub fn pick(&self) -> ContextId {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        ContextId(n % self.contexts.len())
    }

    /// Whether [`ExecutionPool::shutdown`] has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Start `actor` on the given context.
    pub(crate) fn host(&self, context: ContextId, actor: GroupActor) -> KernelResult<()> {
        if self.is_closed() {
            return Err(KernelError::ShutDown);
        }
        let slot = self.contexts.get(context.0).ok_or(KernelError::ShutDown)?;
        let group = actor.id();
        slot.inbox
            .send(ContextMessage::Host(actor))
            .map_err(|_| KernelError::ShutDown)?;
        trace!(%group, context = %slot.id, "actor hosted");
        Ok(())
    }

    /// Close every context and wait for its actors to finish.
    ///
    /// Actors must already have been told to stop (or had their senders
    /// dropped); this call blocks until each one exits. Idempotent.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        for slot in &self.contexts {
            let _ = slot.inbox.send(ContextMessage::Close);
        }
        for slot in &self.contexts {
            let handle = slot
                .thread
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .take();
            if let Some(handle) = handle {
                if handle.join().is_err() {
                    warn!(context = %slot.id, "execution context panicked");
                }
            }
        }
        debug!(size = self.contexts.len(), "execution pool stopped");
    }
}

impl Drop for ExecutionPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for ExecutionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionPool")
            .field("size", &self.contexts.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn serve(id: ContextId, mut inbox: mpsc::UnboundedReceiver<ContextMessage>) {
    debug!(context = %id, "execution context started");
    let mut actors: JoinSet<(GroupId, ExitReason)> = JoinSet::new();
    loop {
        tokio::select! {
            message = inbox.recv() => match message {
                Some(ContextMessage::Host(actor)) => {
                    actors.spawn(actor.run());
                }
                Some(ContextMessage::Close) | None => break,
            },
            Some(joined) = actors.join_next(), if !actors.is_empty() => {
                log_exit(id, joined);
            }
        }
    }
    debug!(context = %id, remaining = actors.len(), "draining execution context");
    while let Some(joined) = actors.join_next().await {
        log_exit(id, joined);
    }
    debug!(context = %id, "execution context stopped");
}

fn log_exit(context: ContextId, joined: Result<(GroupId, ExitReason), JoinError>) {
    match joined {
        Ok((group, ExitReason::Failed)) => {
            warn!(%context, %group, "actor failed");
        }
        Ok((group, reason)) => {
            trace!(%context, %group, ?reason, "actor finished");
        }
        Err(err) => {
            warn!(%context, %err, "actor task aborted");
        }
    }
}
