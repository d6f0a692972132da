//! Multi-qubit gates: merging, entanglement and operand ordering.

use eqsn_kernel::linalg::identity;
use eqsn_kernel::{GateMatrix, Kernel, KernelConfig, QubitKey};

fn kernel() -> Kernel {
    Kernel::new(KernelConfig::default().with_workers(4).with_seed(42)).unwrap()
}

fn keys(names: &[&str]) -> Vec<QubitKey> {
    names.iter().map(|n| QubitKey::from(*n)).collect()
}

// ---------------------------------------------------------------------------
// EPR pairs
// ---------------------------------------------------------------------------

#[test]
fn epr_pair_outcomes_always_agree() {
    let k = kernel();
    let mut seen = [0u32; 2];
    for _ in 0..100 {
        k.create("a").unwrap();
        k.create("b").unwrap();
        k.h_gate("b").unwrap();
        k.cnot_gate("a", "b").unwrap();
        let a = k.measure("a", true).unwrap();
        let b = k.measure("b", true).unwrap();
        assert_eq!(a, b);
        seen[usize::from(a)] += 1;
    }
    assert!(seen[0] > 0 && seen[1] > 0, "outcomes never varied: {seen:?}");
    assert_eq!(k.live_qubits(), 0);
}

#[test]
fn controlled_gate_merges_receiver_first() {
    let k = kernel();
    k.create("a").unwrap();
    k.create("b").unwrap();
    k.h_gate("b").unwrap();
    k.cnot_gate("a", "b").unwrap();

    let snap = k.snapshot("a").unwrap();
    assert_eq!(snap.order, keys(&["b", "a"]));
    let p = snap.probabilities();
    assert!((p[0] - 0.5).abs() < 1e-9);
    assert!((p[3] - 0.5).abs() < 1e-9);
    assert!(p[1].abs() < 1e-9 && p[2].abs() < 1e-9);
    assert_eq!(k.live_groups(), 1);
}

#[test]
fn cphase_on_plus_states_is_detectable() {
    // |+>|+> -> CZ -> H on target gives |1> exactly when control is |1>
    let k = kernel();
    for _ in 0..30 {
        k.create("t").unwrap();
        k.create("c").unwrap();
        k.h_gate("t").unwrap();
        k.h_gate("c").unwrap();
        k.cphase_gate("t", "c").unwrap();
        k.h_gate("t").unwrap();
        let c = k.measure("c", true).unwrap();
        let t = k.measure("t", true).unwrap();
        assert_eq!(c, t);
    }
}

// ---------------------------------------------------------------------------
// Larger groups
// ---------------------------------------------------------------------------

#[test]
fn ghz_chain_of_five() {
    let k = kernel();
    let names: Vec<String> = (0..5).map(|i| format!("q{i}")).collect();
    for _ in 0..20 {
        for name in &names {
            k.create(name.as_str()).unwrap();
        }
        k.h_gate("q0").unwrap();
        for pair in names.windows(2) {
            k.cnot_gate(pair[1].as_str(), pair[0].as_str()).unwrap();
        }
        assert_eq!(k.live_groups(), 1);

        let snap = k.snapshot("q3").unwrap();
        assert_eq!(snap.amplitudes.len(), 32);
        let p = snap.probabilities();
        assert!((p[0] - 0.5).abs() < 1e-9);
        assert!((p[31] - 0.5).abs() < 1e-9);

        let outcomes: Vec<u8> = names
            .iter()
            .map(|n| k.measure(n.as_str(), true).unwrap())
            .collect();
        assert!(outcomes.iter().all(|&o| o == outcomes[0]), "{outcomes:?}");
    }
}

#[test]
fn destructive_measure_shrinks_group() {
    let k = kernel();
    for name in ["a", "b", "c"] {
        k.create(name).unwrap();
    }
    k.x_gate("c").unwrap();
    k.merge("a", "b").unwrap();
    k.merge("b", "c").unwrap();
    assert_eq!(k.snapshot("a").unwrap().amplitudes.len(), 8);

    assert_eq!(k.measure("b", true).unwrap(), 0);
    let snap = k.snapshot("a").unwrap();
    assert_eq!(snap.order.len(), 2);
    assert_eq!(snap.amplitudes.len(), 4);
    assert!(snap.position(&QubitKey::from("b")).is_none());
    assert_eq!(k.measure("c", true).unwrap(), 1);
    assert_eq!(k.measure("a", true).unwrap(), 0);
    assert_eq!(k.live_groups(), 0);
}

// ---------------------------------------------------------------------------
// Two-qubit and controlled two-qubit gates
// ---------------------------------------------------------------------------

#[test]
fn swap_exchanges_states() {
    let k = kernel();
    k.create("a").unwrap();
    k.create("b").unwrap();
    k.x_gate("a").unwrap();
    k.swap_gate("a", "b").unwrap();
    assert_eq!(k.measure("a", true).unwrap(), 0);
    assert_eq!(k.measure("b", true).unwrap(), 1);
}

#[test]
fn custom_two_qubit_gate_respects_operand_order() {
    // CNOT with the first operand as control
    let k = kernel();
    k.create("a").unwrap();
    k.create("b").unwrap();
    k.x_gate("b").unwrap();
    k.custom_two_qubit_gate("b", "a", GateMatrix::cnot()).unwrap();
    assert_eq!(k.measure("a", true).unwrap(), 1);
    assert_eq!(k.measure("b", true).unwrap(), 1);
}

#[test]
fn custom_controlled_gate_with_user_matrix() {
    let k = kernel();
    k.create("t").unwrap();
    k.create("c").unwrap();
    let flip = GateMatrix::from_real_rows(vec![vec![0.0, 1.0], vec![1.0, 0.0]]).unwrap();

    // control |0>: nothing happens
    k.custom_controlled_gate("t", "c", flip.clone()).unwrap();
    assert_eq!(k.measure("t", false).unwrap(), 0);

    // control |1>: target flips
    k.x_gate("c").unwrap();
    k.custom_controlled_gate("t", "c", flip).unwrap();
    assert_eq!(k.measure("t", true).unwrap(), 1);
    assert_eq!(k.measure("c", true).unwrap(), 1);
}

#[test]
fn fredkin_from_four_by_four_swap() {
    let k = kernel();
    for control in [0u8, 1] {
        for name in ["c", "a", "b"] {
            k.create(name).unwrap();
        }
        if control == 1 {
            k.x_gate("c").unwrap();
        }
        k.x_gate("a").unwrap();
        k.apply_controlled_two_qubit_gate("c", "a", "b", GateMatrix::swap())
            .unwrap();
        assert_eq!(k.measure("c", true).unwrap(), control);
        assert_eq!(k.measure("a", true).unwrap(), 1 - control);
        assert_eq!(k.measure("b", true).unwrap(), control);
    }
}

#[test]
fn toffoli_from_eight_by_eight_block() {
    let k = kernel();
    let cnot = GateMatrix::cnot().as_operator().clone();
    let mut full = identity(8);
    full.slice_mut(ndarray::s![4..8, 4..8]).assign(&cnot);

    for name in ["c", "a", "b"] {
        k.create(name).unwrap();
    }
    k.x_gate("c").unwrap();
    k.x_gate("a").unwrap();
    k.custom_controlled_two_qubit_gate("c", "a", "b", GateMatrix::new(full))
        .unwrap();
    assert_eq!(k.measure("b", true).unwrap(), 1);
    assert_eq!(k.measure("a", true).unwrap(), 1);
    assert_eq!(k.measure("c", true).unwrap(), 1);
}
