//! Ownership registry: which group actor currently owns each qubit key.
//!
//! Lookups take the shared side of a fair reader/writer lock; creation,
//! deletion and merge re-pointing take the exclusive side. The lock queues
//! waiters in arrival order, so a pending writer holds back readers that
//! arrive after it and cannot be starved by continuous routing traffic.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;
use tokio::sync::{RwLock, RwLockWriteGuard};
use tracing::{debug, trace, warn};

use crate::actor::Command;
use crate::error::{KernelError, KernelResult};
use crate::pool::ContextId;

/// Opaque caller-supplied identifier of a qubit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QubitKey(String);

impl QubitKey {
    /// Create a key from anything string-like.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QubitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for QubitKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for QubitKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<usize> for QubitKey {
    fn from(key: usize) -> Self {
        Self(key.to_string())
    }
}

/// Identifier of one group actor, unique for the lifetime of a kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(pub u64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group-{}", self.0)
    }
}

/// Route to a group actor: its hosting context and its command channel.
#[derive(Debug, Clone)]
pub struct GroupHandle {
    pub(crate) id: GroupId,
    pub(crate) context: ContextId,
    pub(crate) sender: mpsc::UnboundedSender<Command>,
}

impl GroupHandle {
    pub(crate) fn new(
        id: GroupId,
        context: ContextId,
        sender: mpsc::UnboundedSender<Command>,
    ) -> Self {
        Self {
            id,
            context,
            sender,
        }
    }

    /// Group the handle routes to.
    pub fn id(&self) -> GroupId {
        self.id
    }

    /// Enqueue a command. Fails if the actor has already exited.
    pub(crate) fn send(&self, command: Command) -> Result<(), Command> {
        self.sender.send(command).map_err(|e| e.0)
    }

    /// Whether the actor's inbox has been closed.
    pub(crate) fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Outcome of [`Registry::unregister`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// Other keys still route to the group.
    Retained,
    /// The key was the group's last; the registry dropped its route.
    GroupReleased(GroupId),
}

#[derive(Debug)]
struct GroupSlot {
    handle: GroupHandle,
    keys: usize,
}

#[derive(Debug, Default)]
struct RegistryState {
    routes: FxHashMap<QubitKey, GroupId>,
    groups: FxHashMap<GroupId, GroupSlot>,
}

impl RegistryState {
    fn lookup(&self, key: &QubitKey) -> KernelResult<&GroupHandle> {
        self.routes
            .get(key)
            .and_then(|id| self.groups.get(id))
            .map(|slot| &slot.handle)
            .ok_or_else(|| KernelError::UnknownQubit(key.clone()))
    }

    fn detach(&mut self, key: &QubitKey, from: GroupId) -> Release {
        let Some(slot) = self.groups.get_mut(&from) else {
            return Release::Retained;
        };
        slot.keys = slot.keys.saturating_sub(1);
        if slot.keys == 0 {
            self.groups.remove(&from);
            debug!(qubit = %key, group = %from, "group released");
            Release::GroupReleased(from)
        } else {
            Release::Retained
        }
    }

    /// The group's slot, unless its actor has exited while still routed.
    fn live_slot(&self, id: GroupId) -> Option<&GroupSlot> {
        self.groups.get(&id).filter(|slot| !slot.handle.is_closed())
    }

    fn live_slots(&self) -> impl Iterator<Item = &GroupSlot> {
        self.groups.values().filter(|slot| !slot.handle.is_closed())
    }

    /// The one group owning every key in `keys`, or `None` when they span
    /// several groups.
    fn joint(&self, keys: &[QubitKey]) -> KernelResult<Option<&GroupHandle>> {
        let mut owner: Option<&GroupHandle> = None;
        let mut split = false;
        for key in keys {
            let handle = self.lookup(key)?;
            match owner {
                None => owner = Some(handle),
                Some(first) if first.id != handle.id => split = true,
                Some(_) => {}
            }
        }
        Ok(if split { None } else { owner })
    }

    /// Drop a dead group's slot and every route into it.
    fn purge(&mut self, id: GroupId) -> Vec<QubitKey> {
        if self.groups.remove(&id).is_none() {
            return Vec::new();
        }
        let mut lost = Vec::new();
        self.routes.retain(|key, owner| {
            if *owner == id {
                lost.push(key.clone());
                false
            } else {
                true
            }
        });
        warn!(group = %id, lost = lost.len(), "purged routes of terminated actor");
        lost
    }
}

/// Concurrent map from qubit key to owning group.
#[derive(Debug, Default)]
pub struct Registry {
    state: RwLock<RegistryState>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve keys to their distinct group handles, in first-seen order.
    pub fn resolve(&self, keys: &[QubitKey]) -> KernelResult<Vec<GroupHandle>> {
        let state = self.state.blocking_read();
        let mut handles: Vec<GroupHandle> = Vec::with_capacity(keys.len());
        for key in keys {
            let handle = state.lookup(key)?;
            if !handles.iter().any(|h| h.id == handle.id) {
                handles.push(handle.clone());
            }
        }
        Ok(handles)
    }

    /// Resolve a single key.
    pub fn resolve_one(&self, key: &QubitKey) -> KernelResult<GroupHandle> {
        self.state.blocking_read().lookup(key).cloned()
    }

    /// Resolve `key` and enqueue the command for its group while the shared
    /// section is held, so no merge can slip between lookup and send.
    ///
    /// A send that finds the actor gone purges the group's routes and fails
    /// with `ActorTerminated`.
    pub(crate) fn dispatch(
        &self,
        key: &QubitKey,
        command: impl FnOnce() -> Command,
    ) -> KernelResult<GroupHandle> {
        let dead = {
            let state = self.state.blocking_read();
            let handle = state.lookup(key)?;
            trace!(qubit = %key, group = %handle.id, "dispatch");
            match handle.send(command()) {
                Ok(()) => return Ok(handle.clone()),
                Err(_) => handle.id,
            }
        };
        self.write().purge(dead);
        Err(KernelError::ActorTerminated(key.clone()))
    }

    /// Enqueue `command` on the group owning every key in `keys`, all
    /// resolved under one shared section.
    ///
    /// Returns the command unsent when the keys span several groups.
    pub(crate) fn dispatch_joint(
        &self,
        keys: &[QubitKey],
        command: Command,
    ) -> KernelResult<Option<Command>> {
        let dead = {
            let state = self.state.blocking_read();
            let Some(handle) = state.joint(keys)? else {
                return Ok(Some(command));
            };
            trace!(qubits = keys.len(), group = %handle.id, "joint dispatch");
            match handle.send(command) {
                Ok(()) => return Ok(None),
                Err(_) => handle.id,
            }
        };
        self.write().purge(dead);
        Err(KernelError::ActorTerminated(keys[0].clone()))
    }

    /// Whether `key` is live.
    pub fn contains(&self, key: &QubitKey) -> bool {
        let state = self.state.blocking_read();
        state
            .routes
            .get(key)
            .is_some_and(|id| state.live_slot(*id).is_some())
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.state.blocking_read().live_slots().map(|slot| slot.keys).sum()
    }

    /// True when no key is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of live groups with at least one routed key.
    pub fn group_count(&self) -> usize {
        self.state.blocking_read().live_slots().count()
    }

    /// Live keys hosted by each execution context.
    pub fn context_load(&self) -> FxHashMap<ContextId, usize> {
        let state = self.state.blocking_read();
        let mut load = FxHashMap::default();
        for slot in state.live_slots() {
            *load.entry(slot.handle.context).or_insert(0) += slot.keys;
        }
        load
    }

    /// Route a new key to a fresh group.
    pub fn register(&self, key: QubitKey, handle: GroupHandle) -> KernelResult<()> {
        self.write().register(key, handle)
    }

    /// Remove a key's route.
    pub fn unregister(&self, key: &QubitKey) -> KernelResult<Release> {
        self.write().unregister(key)
    }

    /// Point every key in `keys` at the group currently owning `target`.
    pub fn repoint(&self, keys: &[QubitKey], target: &QubitKey) -> KernelResult<()> {
        self.write().repoint(keys, target)
    }

    /// Enter the exclusive section.
    pub(crate) fn write(&self) -> RegistryWriter<'_> {
        RegistryWriter {
            state: self.state.blocking_write(),
        }
    }
}

/// Exclusive access to the registry, held for the length of a mutation or
/// a whole merge handshake.
pub(crate) struct RegistryWriter<'a> {
    state: RwLockWriteGuard<'a, RegistryState>,
}

impl RegistryWriter<'_> {
    pub(crate) fn lookup(&self, key: &QubitKey) -> KernelResult<GroupHandle> {
        self.state.lookup(key).cloned()
    }

    /// Whether `key` routes to a live group. A route into a terminated actor
    /// is purged on the way, freeing the key for `register`.
    pub(crate) fn contains(&mut self, key: &QubitKey) -> bool {
        let Some(&id) = self.state.routes.get(key) else {
            return false;
        };
        if self.state.live_slot(id).is_some() {
            return true;
        }
        self.state.purge(id);
        false
    }

    pub(crate) fn register(&mut self, key: QubitKey, handle: GroupHandle) -> KernelResult<()> {
        if self.contains(&key) {
            return Err(KernelError::DuplicateKey(key));
        }
        let id = handle.id;
        self.state
            .groups
            .entry(id)
            .or_insert(GroupSlot { handle, keys: 0 })
            .keys += 1;
        self.state.routes.insert(key, id);
        Ok(())
    }

    pub(crate) fn unregister(&mut self, key: &QubitKey) -> KernelResult<Release> {
        let id = self
            .state
            .routes
            .remove(key)
            .ok_or_else(|| KernelError::UnknownQubit(key.clone()))?;
        Ok(self.state.detach(key, id))
    }

    pub(crate) fn repoint(&mut self, keys: &[QubitKey], target: &QubitKey) -> KernelResult<()> {
        let to = self.state.lookup(target)?.id;
        for key in keys {
            let from = *self
                .state
                .routes
                .get(key)
                .ok_or_else(|| KernelError::UnknownQubit(key.clone()))?;
            if from == to {
                continue;
            }
            self.state.detach(key, from);
            self.state.routes.insert(key.clone(), to);
            if let Some(slot) = self.state.groups.get_mut(&to) {
                slot.keys += 1;
            }
        }
        Ok(())
    }

    /// Enqueue `command` on the group owning every key in `keys`. Fails with
    /// `InvalidOperands` if the keys are not in one group.
    pub(crate) fn dispatch_joint(
        &mut self,
        keys: &[QubitKey],
        command: Command,
    ) -> KernelResult<()> {
        let handle = self.state.joint(keys)?.cloned().ok_or_else(|| {
            KernelError::InvalidOperands("operands are not owned by one group".to_string())
        })?;
        if handle.send(command).is_err() {
            self.state.purge(handle.id);
            return Err(KernelError::ActorTerminated(keys[0].clone()));
        }
        Ok(())
    }

    /// Drop a terminated group's slot and routes, returning the keys lost.
    pub(crate) fn purge(&mut self, id: GroupId) -> Vec<QubitKey> {
        self.state.purge(id)
    }

    /// Remove every route and return the handles of the groups they led to.
    pub(crate) fn drain(&mut self) -> Vec<GroupHandle> {
        self.state.routes.clear();
        self.state
            .groups
            .drain()
            .map(|(_, slot)| slot.handle)
            .collect()
    }
}
