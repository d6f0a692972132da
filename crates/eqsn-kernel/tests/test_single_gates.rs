//! Single-qubit gate behaviour through the kernel boundary.

use std::f64::consts::PI;

use eqsn_kernel::{GateMatrix, Kernel, KernelConfig, KernelError};

fn kernel() -> Kernel {
    Kernel::new(KernelConfig::default().with_workers(2).with_seed(7)).unwrap()
}

// ---------------------------------------------------------------------------
// Deterministic algebra
// ---------------------------------------------------------------------------

#[test]
fn hadamard_twice_measures_zero() {
    let k = kernel();
    for _ in 0..20 {
        k.create("q").unwrap();
        k.h_gate("q").unwrap();
        k.h_gate("q").unwrap();
        assert_eq!(k.measure("q", true).unwrap(), 0);
    }
}

#[test]
fn x_measures_one() {
    let k = kernel();
    for _ in 0..20 {
        k.create("q").unwrap();
        k.x_gate("q").unwrap();
        assert_eq!(k.measure("q", true).unwrap(), 1);
    }
}

#[test]
fn y_twice_measures_zero() {
    let k = kernel();
    k.create("q").unwrap();
    k.y_gate("q").unwrap();
    k.y_gate("q").unwrap();
    assert_eq!(k.measure("q", true).unwrap(), 0);
}

#[test]
fn z_twice_measures_zero() {
    let k = kernel();
    k.create("q").unwrap();
    k.z_gate("q").unwrap();
    k.z_gate("q").unwrap();
    assert_eq!(k.measure("q", true).unwrap(), 0);
}

#[test]
fn phase_gates_compose_to_z() {
    // H T T T T H = H Z H = X
    let k = kernel();
    k.create("q").unwrap();
    k.h_gate("q").unwrap();
    for _ in 0..4 {
        k.t_gate("q").unwrap();
    }
    k.h_gate("q").unwrap();
    assert_eq!(k.measure("q", true).unwrap(), 1);

    // H S S H = X
    k.create("q").unwrap();
    k.h_gate("q").unwrap();
    k.s_gate("q").unwrap();
    k.s_gate("q").unwrap();
    k.h_gate("q").unwrap();
    assert_eq!(k.measure("q", true).unwrap(), 1);
}

#[test]
fn rotations_by_pi_flip() {
    let k = kernel();
    k.create("a").unwrap();
    k.rx_gate("a", PI).unwrap();
    assert_eq!(k.measure("a", true).unwrap(), 1);

    k.create("b").unwrap();
    k.ry_gate("b", PI).unwrap();
    assert_eq!(k.measure("b", true).unwrap(), 1);

    k.create("c").unwrap();
    k.rz_gate("c", PI).unwrap();
    assert_eq!(k.measure("c", true).unwrap(), 0);
}

#[test]
fn custom_gate_matches_named_gate() {
    let k = kernel();
    k.create("q").unwrap();
    let flip = GateMatrix::from_real_rows(vec![vec![0.0, 1.0], vec![1.0, 0.0]]).unwrap();
    k.custom_gate("q", flip).unwrap();
    let snap = k.snapshot("q").unwrap();
    assert!((snap.probabilities()[1] - 1.0).abs() < 1e-9);
}

// ---------------------------------------------------------------------------
// Measurement
// ---------------------------------------------------------------------------

#[test]
fn non_destructive_then_destructive_agree() {
    let k = kernel();
    for i in 0..50usize {
        k.create(i).unwrap();
        k.h_gate(i).unwrap();
        let first = k.measure(i, false).unwrap();
        assert!(k.contains(i));
        let second = k.measure(i, true).unwrap();
        assert_eq!(first, second);
        assert!(!k.contains(i));
    }
}

#[test]
fn hadamard_outcomes_are_mixed() {
    let k = kernel();
    let mut ones = 0;
    for i in 0..200usize {
        k.create(i).unwrap();
        k.h_gate(i).unwrap();
        ones += u32::from(k.measure(i, true).unwrap());
    }
    assert!(ones > 50 && ones < 150, "ones = {ones}");
}

#[test]
fn key_can_be_reused_after_destructive_measure() {
    let k = kernel();
    k.create("q").unwrap();
    k.x_gate("q").unwrap();
    k.measure("q", true).unwrap();
    k.create("q").unwrap();
    assert_eq!(k.measure("q", true).unwrap(), 0);
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[test]
fn unknown_qubit_is_reported() {
    let k = kernel();
    assert!(matches!(
        k.x_gate("ghost"),
        Err(KernelError::UnknownQubit(key)) if key.as_str() == "ghost"
    ));
    assert!(matches!(
        k.measure("ghost", false),
        Err(KernelError::UnknownQubit(_))
    ));
    assert!(matches!(k.snapshot("ghost"), Err(KernelError::UnknownQubit(_))));
}

#[test]
fn duplicate_create_is_rejected() {
    let k = kernel();
    k.create("q").unwrap();
    k.x_gate("q").unwrap();
    assert!(matches!(k.create("q"), Err(KernelError::DuplicateKey(_))));
    // the original qubit is untouched
    assert_eq!(k.measure("q", true).unwrap(), 1);
}
