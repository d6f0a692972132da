//! A group of entangled qubits and the numeric operations on its state.
//!
//! A [`Group`] is a plain value: the ordered qubit keys plus the joint state
//! vector they index. It is owned by exactly one actor at a time and moved,
//! never shared, when groups merge.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{KernelError, KernelResult};
use crate::gates::GateMatrix;
use crate::linalg::{
    self, Amplitude, NORM_TOLERANCE, StateVector, clamp_probability, controlled, embed,
    probability_of_one, projector, reduction, tensor, zero_state,
};
use crate::registry::QubitKey;

/// Ordered qubit keys and the joint state vector they span.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    order: Vec<QubitKey>,
    vector: StateVector,
}

/// Read-only copy of a group's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Keys in tensor order.
    pub order: Vec<QubitKey>,
    /// Joint amplitudes, `2^order.len()` entries.
    pub amplitudes: Vec<Amplitude>,
}

impl Snapshot {
    /// Euclidean norm of the amplitudes.
    pub fn norm(&self) -> f64 {
        self.amplitudes
            .iter()
            .map(|a| a.norm_sqr())
            .sum::<f64>()
            .sqrt()
    }

    /// Probability of each basis state.
    pub fn probabilities(&self) -> Vec<f64> {
        self.amplitudes.iter().map(|a| a.norm_sqr()).collect()
    }

    /// Tensor position of a key, if the snapshot contains it.
    pub fn position(&self, key: &QubitKey) -> Option<usize> {
        self.order.iter().position(|k| k == key)
    }
}

impl Group {
    /// A single qubit in |0⟩.
    pub fn new(key: QubitKey) -> Self {
        Self {
            order: vec![key],
            vector: zero_state(1),
        }
    }

    /// Keys in tensor order.
    pub fn order(&self) -> &[QubitKey] {
        &self.order
    }

    /// The joint state vector.
    pub fn vector(&self) -> &StateVector {
        &self.vector
    }

    /// Number of qubits held.
    pub fn num_qubits(&self) -> usize {
        self.order.len()
    }

    /// True once every qubit has been measured away.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Tensor position of `key`.
    pub fn position(&self, key: &QubitKey) -> KernelResult<usize> {
        self.order
            .iter()
            .position(|k| k == key)
            .ok_or_else(|| KernelError::InvalidCommand(format!("qubit '{key}' is not in this group")))
    }

    /// Apply `U` to `key`: `I^{⊗p} ⊗ U ⊗ I^{⊗(n-p-1)}`.
    pub fn apply_single_gate(&mut self, gate: &GateMatrix, key: &QubitKey) -> KernelResult<()> {
        gate.expect_dim("apply_single_gate", 2)?;
        let position = self.position(key)?;
        let op = embed(self.num_qubits(), &[(position, gate.as_operator())]);
        self.vector = op.dot(&self.vector);
        Ok(())
    }

    /// Apply `U` to `target` when `control` is |1⟩.
    pub fn apply_controlled_gate(
        &mut self,
        gate: &GateMatrix,
        target: &QubitKey,
        control: &QubitKey,
    ) -> KernelResult<()> {
        gate.expect_dim("apply_controlled_gate", 2)?;
        distinct(&[target, control])?;
        let t = self.position(target)?;
        let c = self.position(control)?;
        let op = controlled(self.num_qubits(), gate.as_operator(), t, c);
        self.vector = op.dot(&self.vector);
        Ok(())
    }

    /// Swap the tensor positions of two keys.
    ///
    /// The amplitudes are exchanged with three CNOTs (a→b, b→a, a→b), then
    /// the bookkeeping in `order` is swapped to match.
    pub fn reorder(&mut self, a: &QubitKey, b: &QubitKey) -> KernelResult<()> {
        let pa = self.position(a)?;
        let pb = self.position(b)?;
        if pa == pb {
            return Ok(());
        }
        let x = GateMatrix::x();
        let n = self.num_qubits();
        for (target, control) in [(pb, pa), (pa, pb), (pb, pa)] {
            let op = controlled(n, x.as_operator(), target, control);
            self.vector = op.dot(&self.vector);
        }
        self.order.swap(pa, pb);
        Ok(())
    }

    /// Apply a 4x4 operator to `(first, second)`.
    pub fn apply_two_qubit_gate(
        &mut self,
        gate: &GateMatrix,
        first: &QubitKey,
        second: &QubitKey,
    ) -> KernelResult<()> {
        gate.expect_dim("apply_two_qubit_gate", 4)?;
        distinct(&[first, second])?;
        self.bring_to_front(&[first, second])?;
        self.apply_leading(gate);
        Ok(())
    }

    /// Apply an 8x8 block operator to `(control, first, second)`.
    pub fn apply_controlled_two_qubit_gate(
        &mut self,
        gate: &GateMatrix,
        control: &QubitKey,
        first: &QubitKey,
        second: &QubitKey,
    ) -> KernelResult<()> {
        gate.expect_dim("apply_controlled_two_qubit_gate", 8)?;
        distinct(&[control, first, second])?;
        self.bring_to_front(&[control, first, second])?;
        self.apply_leading(gate);
        Ok(())
    }

    /// Measure `key` in the computational basis.
    ///
    /// The outcome is sampled from the clamped marginal probability of |1⟩.
    /// A destructive measurement drops the key and halves the vector; a
    /// non-destructive one projects and keeps it. Both renormalize.
    pub fn measure<R: Rng>(
        &mut self,
        key: &QubitKey,
        destructive: bool,
        rng: &mut R,
    ) -> KernelResult<u8> {
        let position = self.position(key)?;
        let n = self.num_qubits();

        let raw = probability_of_one(&self.vector, n, position);
        let p_one = clamp_probability(raw);
        if (raw - p_one).abs() > NORM_TOLERANCE {
            warn!(qubit = %key, raw, "measurement probability outside [0, 1], clamped");
        }
        let outcome = u8::from(rng.gen_bool(p_one));

        if destructive {
            self.order.remove(position);
            if self.order.is_empty() {
                self.vector = zero_state(0);
                return Ok(outcome);
            }
            self.vector = reduction(n, position, outcome).dot(&self.vector);
        } else {
            let op = embed(n, &[(position, &projector(outcome))]);
            self.vector = op.dot(&self.vector);
        }

        if linalg::renormalize(&mut self.vector) <= f64::EPSILON {
            warn!(qubit = %key, outcome, "measured a zero-probability branch");
        }
        Ok(outcome)
    }

    /// Append another group's qubits: the joint space becomes `self ⊗ other`.
    pub fn absorb(&mut self, other: Group) {
        self.vector = tensor(&self.vector, &other.vector);
        self.order.extend(other.order);
    }

    /// Rescale to unit norm, returning the norm beforehand.
    pub fn renormalize(&mut self) -> f64 {
        linalg::renormalize(&mut self.vector)
    }

    /// Euclidean norm of the state vector.
    pub fn norm(&self) -> f64 {
        linalg::norm(&self.vector)
    }

    /// Copy out the current state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            order: self.order.clone(),
            amplitudes: self.vector.to_vec(),
        }
    }

    /// Move `keys` to positions `0..keys.len()`, in that order.
    fn bring_to_front(&mut self, keys: &[&QubitKey]) -> KernelResult<()> {
        for key in keys {
            self.position(key)?;
        }
        for (slot, key) in keys.iter().enumerate() {
            let occupant = self.order[slot].clone();
            if &occupant != *key {
                self.reorder(key, &occupant)?;
            }
        }
        Ok(())
    }

    /// Apply a block operator covering the leading positions.
    fn apply_leading(&mut self, gate: &GateMatrix) {
        let op = embed(self.num_qubits(), &[(0, gate.as_operator())]);
        self.vector = op.dot(&self.vector);
    }
}

/// Reject operand lists naming a key twice.
pub(crate) fn distinct(keys: &[&QubitKey]) -> KernelResult<()> {
    for (i, key) in keys.iter().enumerate() {
        if keys[..i].contains(key) {
            return Err(KernelError::InvalidOperands(format!(
                "qubit '{key}' named more than once"
            )));
        }
    }
    Ok(())
}
