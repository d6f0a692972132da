//! Dense complex linear algebra for joint state vectors.
//!
//! Qubit positions follow tensor order: position 0 is the leftmost factor of
//! the Kronecker product, i.e. the most significant bit of a basis index.

use ndarray::linalg::kron;
use ndarray::{Array1, Array2, array};
use num_complex::Complex64;

/// A single complex amplitude.
pub type Amplitude = Complex64;

/// Joint amplitudes of `n` qubits, length `2^n`.
pub type StateVector = Array1<Amplitude>;

/// Dense operator acting on a state vector.
pub type Operator = Array2<Amplitude>;

/// Tolerance used when checking that a state vector has unit norm.
pub const NORM_TOLERANCE: f64 = 1e-5;

const ZERO: Amplitude = Complex64::new(0.0, 0.0);
const ONE: Amplitude = Complex64::new(1.0, 0.0);

/// The basis state |0...0⟩ over `num_qubits` qubits.
pub fn zero_state(num_qubits: usize) -> StateVector {
    let mut amplitudes = Array1::from_elem(1 << num_qubits, ZERO);
    amplitudes[0] = ONE;
    amplitudes
}

/// Identity operator of the given dimension.
pub fn identity(dim: usize) -> Operator {
    Array2::eye(dim)
}

/// Projector onto |0⟩ (`bit == 0`) or |1⟩ (any other value).
pub fn projector(bit: u8) -> Operator {
    if bit == 0 {
        array![[ONE, ZERO], [ZERO, ZERO]]
    } else {
        array![[ZERO, ZERO], [ZERO, ONE]]
    }
}

/// Embed operators into an `num_qubits`-qubit space.
///
/// Each factor is `(position, operator)`; an operator of dimension `2^w`
/// covers positions `position..position + w`. Factors must not overlap.
/// Uncovered positions receive identity, with runs of identities collapsed
/// into a single `I(2^k)` factor.
pub fn embed(num_qubits: usize, factors: &[(usize, &Operator)]) -> Operator {
    let mut sorted: Vec<_> = factors.to_vec();
    sorted.sort_by_key(|(position, _)| *position);

    let mut acc = identity(1);
    let mut cursor = 0;
    for (position, operator) in sorted {
        if position > cursor {
            acc = kron(&acc, &identity(1 << (position - cursor)));
        }
        acc = kron(&acc, operator);
        cursor = position + operator.nrows().trailing_zeros() as usize;
    }
    if cursor < num_qubits {
        acc = kron(&acc, &identity(1 << (num_qubits - cursor)));
    }
    acc
}

/// Embed a controlled single-qubit operator.
///
/// Builds `P0(control) ⊗ I(target) + P1(control) ⊗ U(target)` with identity on
/// every other position.
pub fn controlled(num_qubits: usize, unitary: &Operator, target: usize, control: usize) -> Operator {
    let p0 = projector(0);
    let p1 = projector(1);
    let idle = embed(num_qubits, &[(control, &p0)]);
    let active = embed(num_qubits, &[(control, &p1), (target, unitary)]);
    idle + active
}

/// Block-diagonal `diag(I, U)`: identity when the leading control bit is 0,
/// `unitary` when it is 1.
pub fn controlled_block(unitary: &Operator) -> Operator {
    let p0 = projector(0);
    let p1 = projector(1);
    kron(&p0, &identity(unitary.nrows())) + kron(&p1, unitary)
}

/// Operator that keeps only the `outcome` branch of the qubit at `position`
/// and drops that qubit from the space (`2^(n-1)` x `2^n`).
pub fn reduction(num_qubits: usize, position: usize, outcome: u8) -> Operator {
    let row = if outcome == 0 {
        array![[ONE, ZERO]]
    } else {
        array![[ZERO, ONE]]
    };
    let before = identity(1 << position);
    let after = identity(1 << (num_qubits - position - 1));
    kron(&kron(&before, &row), &after)
}

/// Kronecker product of two vectors.
pub fn tensor(left: &StateVector, right: &StateVector) -> StateVector {
    left.iter()
        .flat_map(|a| right.iter().map(move |b| *a * *b))
        .collect()
}

/// 0/1 selection vector marking basis states whose bit at `position` equals `bit`.
pub fn selection(num_qubits: usize, position: usize, bit: u8) -> Array1<f64> {
    let unit = if bit == 0 {
        array![1.0, 0.0]
    } else {
        array![0.0, 1.0]
    };
    let before = Array1::<f64>::ones(1 << position);
    let after = Array1::<f64>::ones(1 << (num_qubits - position - 1));
    let head: Array1<f64> = before
        .iter()
        .flat_map(|a| unit.iter().map(move |b| a * b))
        .collect();
    head.iter()
        .flat_map(|a| after.iter().map(move |b| a * b))
        .collect()
}

/// Marginal probability that the qubit at `position` reads 1.
///
/// The result is not clamped; see [`clamp_probability`].
pub fn probability_of_one(vector: &StateVector, num_qubits: usize, position: usize) -> f64 {
    let mask = selection(num_qubits, position, 1);
    vector
        .iter()
        .zip(mask.iter())
        .map(|(amplitude, weight)| (*amplitude * *weight).norm_sqr())
        .sum()
}

/// Force a probability into `[0, 1]`. Non-finite values map to 0.
pub fn clamp_probability(probability: f64) -> f64 {
    if probability.is_finite() {
        probability.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Euclidean norm of a state vector.
pub fn norm(vector: &StateVector) -> f64 {
    vector.iter().map(Complex64::norm_sqr).sum::<f64>().sqrt()
}

/// Scale a vector to unit norm and return the norm it had before.
///
/// A vector with (numerically) zero norm is left untouched.
pub fn renormalize(vector: &mut StateVector) -> f64 {
    let current = norm(vector);
    if current > f64::EPSILON {
        vector.mapv_inplace(|amplitude| amplitude / current);
    }
    current
}
