//! Gate matrices passed to group actors as opaque payloads.

use ndarray::{Array2, array};
use num_complex::Complex64;
use std::f64::consts::{FRAC_1_SQRT_2, FRAC_PI_4};

use crate::error::{KernelError, KernelResult};
use crate::linalg::{Operator, controlled_block, identity};

/// A dense, square complex matrix acting on one or more qubits.
///
/// Unitarity is the caller's responsibility and is never enforced;
/// [`GateMatrix::is_unitary`] is available as a diagnostic.
#[derive(Debug, Clone, PartialEq)]
pub struct GateMatrix(Operator);

impl GateMatrix {
    /// Wrap an existing operator.
    pub fn new(matrix: Operator) -> Self {
        Self(matrix)
    }

    /// Build a matrix from row vectors. Rows of unequal length yield
    /// `InvalidMatrix`.
    pub fn from_rows(rows: Vec<Vec<Complex64>>) -> KernelResult<Self> {
        let n_rows = rows.len();
        let n_cols = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|row| row.len() != n_cols) {
            return Err(KernelError::InvalidMatrix {
                operation: "from_rows",
                expected: n_rows,
                rows: n_rows,
                cols: n_cols,
            });
        }
        let flat: Vec<Complex64> = rows.into_iter().flatten().collect();
        Array2::from_shape_vec((n_rows, n_cols), flat)
            .map(Self)
            .map_err(|_| KernelError::InvalidMatrix {
                operation: "from_rows",
                expected: n_rows,
                rows: n_rows,
                cols: n_cols,
            })
    }

    /// Build a matrix from real-valued rows.
    pub fn from_real_rows(rows: Vec<Vec<f64>>) -> KernelResult<Self> {
        Self::from_rows(
            rows.into_iter()
                .map(|row| row.into_iter().map(|re| Complex64::new(re, 0.0)).collect())
                .collect(),
        )
    }

    /// Side length of the matrix (rows).
    pub fn dim(&self) -> usize {
        self.0.nrows()
    }

    /// Borrow the underlying operator.
    pub fn as_operator(&self) -> &Operator {
        &self.0
    }

    /// Check the matrix is `expected`x`expected`.
    pub fn expect_dim(&self, operation: &'static str, expected: usize) -> KernelResult<()> {
        let (rows, cols) = self.0.dim();
        if rows == expected && cols == expected {
            Ok(())
        } else {
            Err(KernelError::InvalidMatrix {
                operation,
                expected,
                rows,
                cols,
            })
        }
    }

    /// `U†U ≈ I` within `tolerance`, element-wise.
    pub fn is_unitary(&self, tolerance: f64) -> bool {
        let (rows, cols) = self.0.dim();
        if rows != cols {
            return false;
        }
        let adjoint = self.0.t().mapv(|z| z.conj());
        let product = adjoint.dot(&self.0);
        product
            .iter()
            .zip(identity(rows).iter())
            .all(|(a, b)| (*a - *b).norm() <= tolerance)
    }

    /// Expand a two-qubit unitary into the controlled 8x8 block operator.
    /// An 8x8 input is assumed to already be block-structured.
    pub(crate) fn into_controlled_block(self) -> Self {
        if self.dim() == 4 {
            Self(controlled_block(&self.0))
        } else {
            self
        }
    }

    // =========================================================================
    // Single-qubit gates
    // =========================================================================

    /// Pauli X.
    pub fn x() -> Self {
        Self(array![[c(0.0, 0.0), c(1.0, 0.0)], [c(1.0, 0.0), c(0.0, 0.0)]])
    }

    /// Pauli Y.
    pub fn y() -> Self {
        Self(array![[c(0.0, 0.0), c(0.0, -1.0)], [c(0.0, 1.0), c(0.0, 0.0)]])
    }

    /// Pauli Z.
    pub fn z() -> Self {
        Self(array![[c(1.0, 0.0), c(0.0, 0.0)], [c(0.0, 0.0), c(-1.0, 0.0)]])
    }

    /// Hadamard.
    pub fn h() -> Self {
        let s = FRAC_1_SQRT_2;
        Self(array![[c(s, 0.0), c(s, 0.0)], [c(s, 0.0), c(-s, 0.0)]])
    }

    /// Phase gate S = diag(1, i).
    pub fn s() -> Self {
        Self::phase(2.0 * FRAC_PI_4)
    }

    /// T = diag(1, e^{iπ/4}).
    pub fn t() -> Self {
        Self::phase(FRAC_PI_4)
    }

    /// diag(1, e^{iθ}).
    pub fn phase(theta: f64) -> Self {
        Self(array![
            [c(1.0, 0.0), c(0.0, 0.0)],
            [c(0.0, 0.0), Complex64::from_polar(1.0, theta)]
        ])
    }

    /// Rotation about X by `theta` radians.
    pub fn rx(theta: f64) -> Self {
        let (sin, cos) = (theta / 2.0).sin_cos();
        Self(array![[c(cos, 0.0), c(0.0, -sin)], [c(0.0, -sin), c(cos, 0.0)]])
    }

    /// Rotation about Y by `theta` radians.
    pub fn ry(theta: f64) -> Self {
        let (sin, cos) = (theta / 2.0).sin_cos();
        Self(array![[c(cos, 0.0), c(-sin, 0.0)], [c(sin, 0.0), c(cos, 0.0)]])
    }

    /// Rotation about Z by `theta` radians.
    pub fn rz(theta: f64) -> Self {
        Self(array![
            [Complex64::from_polar(1.0, -theta / 2.0), c(0.0, 0.0)],
            [c(0.0, 0.0), Complex64::from_polar(1.0, theta / 2.0)]
        ])
    }

    // =========================================================================
    // Two-qubit gates
    // =========================================================================

    /// SWAP.
    pub fn swap() -> Self {
        let mut m = Array2::from_elem((4, 4), c(0.0, 0.0));
        m[[0, 0]] = c(1.0, 0.0);
        m[[1, 2]] = c(1.0, 0.0);
        m[[2, 1]] = c(1.0, 0.0);
        m[[3, 3]] = c(1.0, 0.0);
        Self(m)
    }

    /// CNOT with the first operand as control.
    pub fn cnot() -> Self {
        Self(controlled_block(&Self::x().0))
    }
}

impl From<Operator> for GateMatrix {
    fn from(matrix: Operator) -> Self {
        Self(matrix)
    }
}

fn c(re: f64, im: f64) -> Complex64 {
    Complex64::new(re, im)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_standard_gates_are_unitary() {
        let gates = [
            GateMatrix::x(),
            GateMatrix::y(),
            GateMatrix::z(),
            GateMatrix::h(),
            GateMatrix::s(),
            GateMatrix::t(),
            GateMatrix::rx(0.3),
            GateMatrix::ry(1.1),
            GateMatrix::rz(-2.0),
            GateMatrix::phase(PI / 3.0),
            GateMatrix::swap(),
            GateMatrix::cnot(),
        ];
        for gate in &gates {
            assert!(gate.is_unitary(1e-12), "not unitary: {gate:?}");
        }
    }

    #[test]
    fn test_non_unitary_detected() {
        let m = GateMatrix::from_real_rows(vec![vec![1.0, 1.0], vec![0.0, 1.0]]).unwrap();
        assert!(!m.is_unitary(1e-9));
    }

    #[test]
    fn test_from_rows_ragged() {
        let result = GateMatrix::from_real_rows(vec![vec![1.0, 0.0], vec![0.0]]);
        assert!(matches!(result, Err(KernelError::InvalidMatrix { .. })));
    }

    #[test]
    fn test_expect_dim() {
        assert!(GateMatrix::x().expect_dim("apply_gate", 2).is_ok());
        let err = GateMatrix::swap().expect_dim("apply_gate", 2).unwrap_err();
        assert!(matches!(
            err,
            KernelError::InvalidMatrix {
                expected: 2,
                rows: 4,
                cols: 4,
                ..
            }
        ));
    }

    #[test]
    fn test_controlled_block_expansion() {
        let block = GateMatrix::swap().into_controlled_block();
        assert_eq!(block.dim(), 8);
        assert!(block.is_unitary(1e-12));

        let already = GateMatrix::new(identity(8)).into_controlled_block();
        assert_eq!(already.dim(), 8);
    }

    #[test]
    fn test_rx_pi_is_x_up_to_phase() {
        let rx = GateMatrix::rx(PI);
        let m = rx.as_operator();
        assert!(m[[0, 0]].norm() < 1e-12);
        assert!((m[[0, 1]] - c(0.0, -1.0)).norm() < 1e-12);
    }
}
