//! The gate engine: evaluation of one arithmetic constraint at one row.
//!
//! A gate reads cells (a column index plus a rotation relative to the row
//! being checked) and returns residuals that must all be zero. The engine
//! is a pure function over field arithmetic: a violated constraint shows up
//! as a non-zero residual, never as an error. Errors are reserved for gates
//! that read cells the proof never opened, which is a configuration mistake
//! and not a cryptographic failure.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;
use thiserror::Error;

use pasta_curves::group::ff::Field;

use super::field::Fp;
use crate::error::ErrorKind;

/// A cell read by a gate: `column` at `row + rotation`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellRef {
    pub column: usize,
    pub rotation: i32,
}

impl CellRef {
    pub const fn new(column: usize, rotation: i32) -> Self {
        Self { column, rotation }
    }

    /// The absolute row this cell resolves to in a trace of `rows` rows.
    pub fn row_at(&self, row: u64, rows: u64) -> u64 {
        let rows = rows as i64;
        (row as i64 + self.rotation as i64).rem_euclid(rows) as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    #[error("Gate reads column {column}, but the circuit only has {columns} columns")]
    ColumnOutOfRange { column: usize, columns: usize },

    #[error("Gate reads column {column} at rotation {rotation}, which the proof does not open")]
    RotationNotOpened { column: usize, rotation: i32 },
}

impl GateError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Configuration
    }
}

/// Per-column list of rotations the proof opens at every query row.
/// `columns_rotations[c]` lists the rotations for column `c`, in the order
/// the openings appear in the proof.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnsRotations(pub Vec<Vec<i32>>);

impl ColumnsRotations {
    /// Every column opened at rotation 0 only.
    pub fn uniform(columns: usize) -> Self {
        Self(vec![vec![0]; columns])
    }

    pub fn columns(&self) -> usize {
        self.0.len()
    }

    pub fn rotations(&self, column: usize) -> Option<&[i32]> {
        self.0.get(column).map(Vec::as_slice)
    }

    /// Position of `cell` among the openings of its column.
    pub fn index_of(&self, cell: CellRef) -> Result<usize, GateError> {
        let rotations = self.rotations(cell.column).ok_or(GateError::ColumnOutOfRange {
            column: cell.column,
            columns: self.columns(),
        })?;
        rotations
            .iter()
            .position(|&r| r == cell.rotation)
            .ok_or(GateError::RotationNotOpened {
                column: cell.column,
                rotation: cell.rotation,
            })
    }

    /// Add a rotation to a column's opening list if it is not there yet.
    pub fn require(&mut self, cell: CellRef) {
        if self.0.len() <= cell.column {
            self.0.resize(cell.column + 1, Vec::new());
        }
        let rotations = &mut self.0[cell.column];
        if !rotations.contains(&cell.rotation) {
            rotations.push(cell.rotation);
        }
    }
}

/// Opened values at one evaluation row: `values[c][i]` is column `c` at
/// rotation `rotations[c][i]`.
#[derive(Clone, Copy, Debug)]
pub struct Evaluations<'a> {
    values: &'a [Vec<Fp>],
    rotations: &'a ColumnsRotations,
}

impl<'a> Evaluations<'a> {
    pub fn new(values: &'a [Vec<Fp>], rotations: &'a ColumnsRotations) -> Self {
        Self { values, rotations }
    }

    pub fn get(&self, cell: CellRef) -> Result<Fp, GateError> {
        let index = self.rotations.index_of(cell)?;
        self.values
            .get(cell.column)
            .and_then(|column| column.get(index))
            .copied()
            .ok_or(GateError::ColumnOutOfRange {
                column: cell.column,
                columns: self.values.len(),
            })
    }
}

/// A named arithmetic relation over opened cells.
pub trait Gate: Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// Every cell the gate reads. The verifier checks these against the
    /// proof's `columns_rotations` before evaluating anything.
    fn cells(&self) -> Vec<CellRef>;

    /// Individual constraint residuals; all zero iff the row satisfies the gate.
    fn constraints(&self, evals: &Evaluations<'_>) -> Result<Vec<Fp>, GateError>;

    /// Residuals folded into one element with powers of `theta`
    /// (`c0·θ^(n-1) + … + c(n-1)`). For a random `theta` this is zero only
    /// when every residual is.
    fn evaluate(&self, evals: &Evaluations<'_>, theta: Fp) -> Result<Fp, GateError> {
        let residuals = self.constraints(evals)?;
        Ok(residuals
            .into_iter()
            .fold(Fp::ZERO, |acc, residual| acc * theta + residual))
    }
}

/// The gates a circuit enforces at every row.
pub type GateSet = Vec<Arc<dyn Gate>>;

/// Evaluate `gate` over opened `column_values` laid out per `rotations`.
pub fn evaluate(
    gate: &dyn Gate,
    column_values: &[Vec<Fp>],
    rotations: &ColumnsRotations,
    theta: Fp,
) -> Result<Fp, GateError> {
    gate.evaluate(&Evaluations::new(column_values, rotations), theta)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `a(row) + b(row) - a(row + 1) = 0`
    #[derive(Debug)]
    struct FibonacciGate;

    impl Gate for FibonacciGate {
        fn name(&self) -> &'static str {
            "fibonacci"
        }

        fn cells(&self) -> Vec<CellRef> {
            vec![CellRef::new(0, 0), CellRef::new(1, 0), CellRef::new(0, 1)]
        }

        fn constraints(&self, evals: &Evaluations<'_>) -> Result<Vec<Fp>, GateError> {
            let a = evals.get(CellRef::new(0, 0))?;
            let b = evals.get(CellRef::new(1, 0))?;
            let next = evals.get(CellRef::new(0, 1))?;
            Ok(vec![a + b - next])
        }
    }

    fn rotations() -> ColumnsRotations {
        ColumnsRotations(vec![vec![0, 1], vec![0]])
    }

    #[test]
    fn test_satisfied_gate_evaluates_to_zero() {
        let values = vec![
            vec![Fp::from(3u64), Fp::from(8u64)],
            vec![Fp::from(5u64)],
        ];
        let result = evaluate(&FibonacciGate, &values, &rotations(), Fp::from(7u64)).unwrap();
        assert_eq!(result, Fp::ZERO);
    }

    #[test]
    fn test_violated_gate_leaves_residual() {
        let values = vec![
            vec![Fp::from(3u64), Fp::from(9u64)],
            vec![Fp::from(5u64)],
        ];
        let result = evaluate(&FibonacciGate, &values, &rotations(), Fp::from(7u64)).unwrap();
        assert_eq!(result, -Fp::ONE);
    }

    #[test]
    fn test_unopened_rotation_is_configuration_error() {
        let values = vec![vec![Fp::from(3u64)], vec![Fp::from(5u64)]];
        let rotations = ColumnsRotations::uniform(2);
        let err = evaluate(&FibonacciGate, &values, &rotations, Fp::ONE).unwrap_err();
        assert_eq!(
            err,
            GateError::RotationNotOpened {
                column: 0,
                rotation: 1
            }
        );
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_missing_column_is_configuration_error() {
        let values = vec![vec![Fp::from(3u64), Fp::from(8u64)]];
        let rotations = ColumnsRotations(vec![vec![0, 1]]);
        let err = evaluate(&FibonacciGate, &values, &rotations, Fp::ONE).unwrap_err();
        assert!(matches!(err, GateError::ColumnOutOfRange { column: 1, .. }));
    }

    #[test]
    fn test_row_at_wraps_around_trace() {
        assert_eq!(CellRef::new(0, 1).row_at(15, 16), 0);
        assert_eq!(CellRef::new(0, -1).row_at(0, 16), 15);
        assert_eq!(CellRef::new(0, 0).row_at(4, 16), 4);
    }

    #[test]
    fn test_require_extends_rotations_once() {
        let mut rotations = ColumnsRotations::default();
        rotations.require(CellRef::new(2, 1));
        rotations.require(CellRef::new(2, 1));
        rotations.require(CellRef::new(0, 0));
        assert_eq!(rotations.0, vec![vec![0], vec![], vec![1]]);
    }
}
