//! Fixture prover.
//!
//! Commits a fully assigned trace and answers the verifier's queries. It
//! exists so tests and local simulations can produce bundles the verifier
//! accepts; it does no arithmetization of its own and does not check that
//! the trace satisfies the gates (an unsatisfied trace simply yields a proof
//! that gets rejected).

use std::sync::Arc;

use pasta_curves::group::ff::Field;
use pasta_curves::group::prime::PrimeCurveAffine;
use pasta_curves::group::{Curve, Group};
use pasta_curves::pallas;
use thiserror::Error;

use super::field::Fp;
use super::gate::{CellRef, ColumnsRotations, Gate, GateSet};
use super::merkle::MerkleTree;
use super::proof::{InitParams, Opening, ProofBundle, ProofData, QueryOpenings};
use super::transcript::Transcript;
use super::unified_addition::{assign, UnifiedAdditionGate, UNIFIED_ADDITION_WIDTH};
use super::verifier::{absorb_header, TRANSCRIPT_DOMAIN};
use crate::error::ErrorKind;

/// Rows in the addition circuit (`2^4`).
pub const ADDITION_ROWS_LOG2: u32 = 4;
/// The public input column sits right after the gate's witness columns.
pub const ADDITION_PUBLIC_INPUT_COLUMN: u32 = UNIFIED_ADDITION_WIDTH as u32;
pub const ADDITION_QUERY_COUNT: u32 = 8;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProverError {
    #[error("Trace does not match init_params: {reason}")]
    TraceShape { reason: String },
}

impl ProverError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Configuration
    }
}

/// Commit `trace` (column-major) and open it at the transcript's query rows.
pub fn prove(
    trace: &[Vec<Fp>],
    gates: &[Arc<dyn Gate>],
    init: &InitParams,
) -> Result<ProofBundle, ProverError> {
    let shape = |reason: String| ProverError::TraceShape { reason };
    let rows = init.rows();
    let pi_column = init.public_input_column as usize;
    let pi_len = init.public_input_len as usize;

    if trace.len() != init.columns as usize {
        return Err(shape(format!(
            "{} columns, expected {}",
            trace.len(),
            init.columns
        )));
    }
    if let Some((column, values)) = trace
        .iter()
        .enumerate()
        .find(|(_, values)| values.len() as u64 != rows)
    {
        return Err(shape(format!(
            "column {column} has {} rows, expected {rows}",
            values.len()
        )));
    }
    if pi_column >= trace.len() || pi_len as u64 > rows {
        return Err(shape(format!(
            "public input column {pi_column} with {pi_len} rows does not fit"
        )));
    }

    let mut rotations = ColumnsRotations::uniform(trace.len());
    for gate in gates {
        for cell in gate.cells() {
            if cell.column >= trace.len() {
                return Err(shape(format!(
                    "gate '{}' reads column {}",
                    gate.name(),
                    cell.column
                )));
            }
            rotations.require(cell);
        }
    }

    let trees = trace
        .iter()
        .enumerate()
        .map(|(column, values)| {
            MerkleTree::new(values)
                .ok_or_else(|| shape(format!("column {column} length is not a power of two")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let commitments: Vec<[u8; 32]> = trees.iter().map(MerkleTree::root).collect();

    let public_input = &trace[pi_column][..pi_len];
    let mut transcript = Transcript::new(TRANSCRIPT_DOMAIN);
    absorb_header(&mut transcript, init, &rotations, public_input, &commitments);

    let public_openings = (0..pi_len)
        .map(|row| Opening {
            value: trace[pi_column][row],
            path: trees[pi_column].path(row),
        })
        .collect();

    // Drawn to keep the transcript in step with the verifier.
    let _theta = transcript.challenge_fp();

    let mut queries = Vec::with_capacity(init.query_count as usize);
    for _ in 0..init.query_count {
        let row = transcript.challenge_index(rows);
        let columns = rotations
            .0
            .iter()
            .enumerate()
            .map(|(column, list)| {
                list.iter()
                    .map(|&rotation| {
                        let at = CellRef::new(column, rotation).row_at(row, rows) as usize;
                        Opening {
                            value: trace[column][at],
                            path: trees[column].path(at),
                        }
                    })
                    .collect()
            })
            .collect();
        queries.push(QueryOpenings { columns });
    }

    let data = ProofData {
        commitments,
        public_openings,
        queries,
    };
    Ok(ProofBundle {
        proof: data.encode(),
        init_params: init.clone(),
        columns_rotations: rotations,
    })
}

/// A circuit of one unified addition per row with a public input column.
#[derive(Clone, Debug)]
pub struct AdditionCircuit {
    /// Column-major: `trace[c][row]`.
    pub trace: Vec<Vec<Fp>>,
    pub gates: GateSet,
    pub init_params: InitParams,
    pub public_input: Vec<Fp>,
}

/// The gate set the addition circuit enforces.
pub fn addition_gates() -> GateSet {
    vec![Arc::new(UnifiedAdditionGate::default())]
}

/// Build the addition circuit carrying `public_input` in its last column.
/// Row 0..4 exercise `O + P`, `P + O`, doubling and `P + (−P)`; the rest
/// are generic additions.
pub fn addition_circuit(public_input: &[Fp]) -> Result<AdditionCircuit, ProverError> {
    let rows = 1usize << ADDITION_ROWS_LOG2;
    if public_input.len() > rows {
        return Err(ProverError::TraceShape {
            reason: format!(
                "{} public inputs exceed {rows} rows",
                public_input.len()
            ),
        });
    }

    let multiple = |k: u64| (pallas::Point::generator() * pallas::Scalar::from(k)).to_affine();
    let identity = pallas::Affine::identity();

    let mut trace = vec![vec![Fp::ZERO; rows]; UNIFIED_ADDITION_WIDTH + 1];
    for row in 0..rows {
        let (p, q) = match row {
            0 => (identity, multiple(1)),
            1 => (multiple(2), identity),
            2 => (multiple(3), multiple(3)),
            3 => (multiple(5), -multiple(5)),
            _ => (multiple(row as u64 + 1), multiple(2 * row as u64 + 3)),
        };
        for (column, value) in assign(&p, &q).into_iter().enumerate() {
            trace[column][row] = value;
        }
    }
    let pi_column = ADDITION_PUBLIC_INPUT_COLUMN as usize;
    trace[pi_column][..public_input.len()].copy_from_slice(public_input);

    Ok(AdditionCircuit {
        trace,
        gates: addition_gates(),
        init_params: InitParams {
            rows_log2: ADDITION_ROWS_LOG2,
            columns: UNIFIED_ADDITION_WIDTH as u32 + 1,
            public_input_column: ADDITION_PUBLIC_INPUT_COLUMN,
            public_input_len: public_input.len() as u32,
            query_count: ADDITION_QUERY_COUNT,
        },
        public_input: public_input.to_vec(),
    })
}

/// A bundle over the addition circuit binding `public_input`.
pub fn addition_proof(public_input: &[Fp]) -> Result<ProofBundle, ProverError> {
    let circuit = addition_circuit(public_input)?;
    prove(&circuit.trace, &circuit.gates, &circuit.init_params)
}
