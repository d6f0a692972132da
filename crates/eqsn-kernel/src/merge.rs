//! Merge coordinator.
//!
//! Joins the groups owning two keys into one. The group owning the first key
//! sends its whole state to the group owning the second; the receiver's
//! joint order is `receiver ⊗ sender`. The registry's exclusive section is
//! held for the whole handshake, so no command can be routed to the sender
//! after its `MergeSend` and no other merge observes a half-updated map.

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::actor::Command;
use crate::error::{KernelError, KernelResult};
use crate::registry::{GroupId, QubitKey, Registry, RegistryWriter};

/// Result of a merge request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Both keys were already owned by the same group.
    AlreadyMerged(GroupId),
    /// `moved` now route to `into`.
    Merged {
        into: GroupId,
        moved: Vec<QubitKey>,
    },
}

impl MergeOutcome {
    /// Group owning both keys after the call.
    pub fn group(&self) -> GroupId {
        match self {
            MergeOutcome::AlreadyMerged(id) => *id,
            MergeOutcome::Merged { into, .. } => *into,
        }
    }
}

/// Ensure `sender` and `acceptor` are owned by one group.
///
/// Fails with `UnknownQubit` if either key is not live and with
/// `ActorTerminated` if either actor exits before the handshake completes.
/// On failure the only registry change is the removal of routes into
/// actors that have already terminated.
pub fn merge(
    registry: &Registry,
    sender: &QubitKey,
    acceptor: &QubitKey,
) -> KernelResult<MergeOutcome> {
    let handles = registry.resolve(&[sender.clone(), acceptor.clone()])?;
    if let [only] = handles.as_slice() {
        return Ok(MergeOutcome::AlreadyMerged(only.id()));
    }
    let mut writer = registry.write();
    merge_locked(&mut writer, sender, acceptor)
}

/// Merge each `(sender, acceptor)` pair in turn, then enqueue `command` on
/// the resulting group, without leaving the registry's exclusive section
/// in between.
///
/// Every key in `operands` must be live and owned by that group when the
/// command is enqueued, so a concurrent destructive measurement either
/// removes an operand first (the call fails with `UnknownQubit`) or is
/// queued behind the command.
pub(crate) fn merge_and_dispatch(
    registry: &Registry,
    pairs: &[(&QubitKey, &QubitKey)],
    operands: &[QubitKey],
    command: Command,
) -> KernelResult<()> {
    let Some(command) = registry.dispatch_joint(operands, command)? else {
        return Ok(());
    };
    let mut writer = registry.write();
    for (sender, acceptor) in pairs {
        merge_locked(&mut writer, sender, acceptor)?;
    }
    writer.dispatch_joint(operands, command)
}

fn merge_locked(
    writer: &mut RegistryWriter<'_>,
    sender: &QubitKey,
    acceptor: &QubitKey,
) -> KernelResult<MergeOutcome> {
    // Re-check under the exclusive section: another merge may have joined
    // the two groups since the shared lookup.
    let from = writer.lookup(sender)?;
    let into = writer.lookup(acceptor)?;
    if from.id() == into.id() {
        return Ok(MergeOutcome::AlreadyMerged(into.id()));
    }
    if into.is_closed() {
        writer.purge(into.id());
        return Err(KernelError::ActorTerminated(acceptor.clone()));
    }

    debug!(from = %from.id(), into = %into.id(), %sender, %acceptor, "merge started");
    let (transfer_tx, transfer_rx) = oneshot::channel();
    let (ack_tx, ack_rx) = oneshot::channel();
    if from
        .send(Command::MergeSend {
            transfer: transfer_tx,
        })
        .is_err()
    {
        writer.purge(from.id());
        return Err(KernelError::ActorTerminated(sender.clone()));
    }
    if into
        .send(Command::MergeAccept {
            transfer: transfer_rx,
            reply: ack_tx,
        })
        .is_err()
    {
        warn!(into = %into.id(), "acceptor exited mid-handshake, sender state lost");
        writer.purge(from.id());
        writer.purge(into.id());
        return Err(KernelError::ActorTerminated(acceptor.clone()));
    }

    let moved = match ack_rx.blocking_recv() {
        Ok(moved) => moved,
        Err(_) => {
            writer.purge(from.id());
            if into.is_closed() {
                writer.purge(into.id());
            }
            return Err(KernelError::ActorTerminated(sender.clone()));
        }
    };
    writer.repoint(&moved, acceptor)?;

    debug!(into = %into.id(), moved = moved.len(), "merge completed");
    Ok(MergeOutcome::Merged {
        into: into.id(),
        moved,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{ActorSettings, GroupActor};
    use crate::group::Group;
    use crate::pool::{ContextId, ExecutionPool};
    use crate::registry::GroupHandle;
    use tokio::sync::mpsc;

    fn spawn(pool: &ExecutionPool, registry: &Registry, id: u64, key: &str) {
        let (tx, rx) = mpsc::unbounded_channel();
        let context = pool.pick();
        let actor = GroupActor::new(
            GroupId(id),
            Group::new(QubitKey::from(key)),
            rx,
            ActorSettings {
                seed: Some(3),
                renormalize_every: 0,
            },
        );
        pool.host(context, actor).unwrap();
        registry
            .register(QubitKey::from(key), GroupHandle::new(GroupId(id), context, tx))
            .unwrap();
    }

    fn stop_all(registry: &Registry, pool: &ExecutionPool) {
        for handle in registry.write().drain() {
            let _ = handle.send(Command::Stop);
        }
        pool.shutdown();
    }

    #[test]
    fn test_merge_repoints_sender_keys() {
        let pool = ExecutionPool::start(2).unwrap();
        let registry = Registry::new();
        spawn(&pool, &registry, 1, "a");
        spawn(&pool, &registry, 2, "b");

        let outcome = merge(&registry, &QubitKey::from("a"), &QubitKey::from("b")).unwrap();
        assert_eq!(
            outcome,
            MergeOutcome::Merged {
                into: GroupId(2),
                moved: vec![QubitKey::from("a")],
            }
        );
        assert_eq!(registry.group_count(), 1);
        assert_eq!(
            registry.resolve_one(&QubitKey::from("a")).unwrap().id(),
            GroupId(2)
        );

        let again = merge(&registry, &QubitKey::from("b"), &QubitKey::from("a")).unwrap();
        assert_eq!(again, MergeOutcome::AlreadyMerged(GroupId(2)));
        stop_all(&registry, &pool);
    }

    #[test]
    fn test_merge_unknown_key() {
        let pool = ExecutionPool::start(1).unwrap();
        let registry = Registry::new();
        spawn(&pool, &registry, 1, "a");
        let err = merge(&registry, &QubitKey::from("a"), &QubitKey::from("nope")).unwrap_err();
        assert!(matches!(err, KernelError::UnknownQubit(_)));
        stop_all(&registry, &pool);
    }

    #[test]
    fn test_merge_with_dead_sender_purges_its_routes() {
        let pool = ExecutionPool::start(1).unwrap();
        let registry = Registry::new();
        spawn(&pool, &registry, 2, "b");
        // route "a" to a group whose actor never existed
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        registry
            .register(QubitKey::from("a"), GroupHandle::new(GroupId(1), ContextId(0), tx))
            .unwrap();

        let err = merge(&registry, &QubitKey::from("a"), &QubitKey::from("b")).unwrap_err();
        assert!(matches!(err, KernelError::ActorTerminated(_)));
        assert!(!registry.contains(&QubitKey::from("a")));
        assert_eq!(
            registry.resolve_one(&QubitKey::from("b")).unwrap().id(),
            GroupId(2)
        );
        assert_eq!(registry.group_count(), 1);
        stop_all(&registry, &pool);
    }

    #[test]
    fn test_merge_and_dispatch_enqueues_on_joint_group() {
        let pool = ExecutionPool::start(2).unwrap();
        let registry = Registry::new();
        spawn(&pool, &registry, 1, "a");
        spawn(&pool, &registry, 2, "b");
        let (a, b) = (QubitKey::from("a"), QubitKey::from("b"));

        let (reply, snapshot) = oneshot::channel();
        merge_and_dispatch(
            &registry,
            &[(&a, &b)],
            &[a.clone(), b.clone()],
            Command::Snapshot { reply },
        )
        .unwrap();
        assert_eq!(snapshot.blocking_recv().unwrap().order, vec![b.clone(), a.clone()]);

        let err = merge_and_dispatch(
            &registry,
            &[(&a, &b)],
            &[a.clone(), QubitKey::from("gone")],
            Command::Stop,
        )
        .unwrap_err();
        assert!(matches!(err, KernelError::UnknownQubit(_)));
        stop_all(&registry, &pool);
    }
}
