//! Merge protocol and registry ownership through the kernel boundary.

use eqsn_kernel::{Kernel, KernelConfig, KernelError, MergeOutcome, QubitKey};

fn kernel() -> Kernel {
    Kernel::new(KernelConfig::default().with_workers(3).with_seed(1)).unwrap()
}

fn keys(names: &[&str]) -> Vec<QubitKey> {
    names.iter().map(|n| QubitKey::from(*n)).collect()
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[test]
fn first_named_key_is_sent() {
    let k = kernel();
    k.create("a").unwrap();
    k.create("b").unwrap();
    match k.merge("a", "b").unwrap() {
        MergeOutcome::Merged { moved, .. } => assert_eq!(moved, keys(&["a"])),
        other => panic!("expected a merge, got {other:?}"),
    }
    assert_eq!(k.snapshot("b").unwrap().order, keys(&["b", "a"]));
}

#[test]
fn merge_is_idempotent() {
    let k = kernel();
    k.create("a").unwrap();
    k.create("b").unwrap();
    let first = k.merge("a", "b").unwrap();
    let second = k.merge("a", "b").unwrap();
    let reversed = k.merge("b", "a").unwrap();
    assert_eq!(second, MergeOutcome::AlreadyMerged(first.group()));
    assert_eq!(reversed, MergeOutcome::AlreadyMerged(first.group()));
    assert_eq!(k.snapshot("a").unwrap().amplitudes.len(), 4);
}

#[test]
fn merging_multi_qubit_groups_moves_every_key() {
    let k = kernel();
    for name in ["a", "b", "c", "d"] {
        k.create(name).unwrap();
    }
    k.merge("a", "b").unwrap();
    k.merge("c", "d").unwrap();
    match k.merge("b", "d").unwrap() {
        MergeOutcome::Merged { moved, .. } => assert_eq!(moved, keys(&["b", "a"])),
        other => panic!("expected a merge, got {other:?}"),
    }
    let snap = k.snapshot("a").unwrap();
    assert_eq!(snap.order, keys(&["d", "c", "b", "a"]));
    assert_eq!(snap.amplitudes.len(), 16);
    assert!((snap.norm() - 1.0).abs() < 1e-9);
}

#[test]
fn merge_preserves_local_states() {
    let k = kernel();
    k.create("a").unwrap();
    k.create("b").unwrap();
    k.x_gate("a").unwrap();
    k.merge("a", "b").unwrap();
    // order is [b, a]: |0>_b |1>_a is basis index 1
    let p = k.snapshot("a").unwrap().probabilities();
    assert!((p[1] - 1.0).abs() < 1e-9);
}

// ---------------------------------------------------------------------------
// Ownership
// ---------------------------------------------------------------------------

#[test]
fn every_key_has_exactly_one_owner() {
    let k = kernel();
    let names: Vec<String> = (0..8).map(|i| format!("k{i}")).collect();
    for name in &names {
        k.create(name.as_str()).unwrap();
    }
    k.merge("k0", "k1").unwrap();
    k.merge("k2", "k3").unwrap();
    k.merge("k1", "k3").unwrap();
    k.merge("k5", "k6").unwrap();

    assert_eq!(k.live_qubits(), 8);
    assert_eq!(k.live_groups(), 4);
    let mut owned: Vec<QubitKey> = Vec::new();
    for probe in ["k0", "k4", "k5", "k7"] {
        owned.extend(k.snapshot(probe).unwrap().order);
    }
    owned.sort();
    let mut expected: Vec<QubitKey> = names.iter().map(|n| QubitKey::from(n.as_str())).collect();
    expected.sort();
    assert_eq!(owned, expected);

    let load: usize = k.context_load().values().sum();
    assert_eq!(load, 8);
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[test]
fn merge_with_unknown_key_fails() {
    let k = kernel();
    k.create("a").unwrap();
    assert!(matches!(
        k.merge("a", "missing"),
        Err(KernelError::UnknownQubit(key)) if key.as_str() == "missing"
    ));
    assert!(matches!(
        k.cnot_gate("missing", "a"),
        Err(KernelError::UnknownQubit(_))
    ));
    assert_eq!(k.live_groups(), 1);
}

#[test]
fn merge_after_destructive_measure_fails() {
    let k = kernel();
    k.create("a").unwrap();
    k.create("b").unwrap();
    k.measure("a", true).unwrap();
    assert!(matches!(
        k.merge("a", "b"),
        Err(KernelError::UnknownQubit(_))
    ));
}
