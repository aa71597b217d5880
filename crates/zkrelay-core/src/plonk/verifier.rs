//! Proof verification over committed trace columns.
//!
//! The verifier never sees the trace. It sees one Merkle commitment per
//! column, the public input rows opened against the public-input column, and
//! for each Fiat–Shamir query row every column opened at each of its
//! rotations. At every query row it re-evaluates each gate over the opened
//! values and requires the folded residual to be zero.
//!
//! Verification is a pure function of `(bundle, public_input, gates)`. Any
//! missing, extra or malformed field is a rejection, never a default.

use std::fmt::Debug;
use std::sync::Arc;

use pasta_curves::group::ff::Field;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::field::Fp;
use super::gate::{CellRef, ColumnsRotations, Evaluations, Gate, GateError};
use super::merkle::{leaf_hash, verify_merkle_branch};
use super::proof::{InitParams, Opening, ProofBundle, ProofCodecError, ProofData};
use super::transcript::Transcript;
use crate::error::ErrorKind;

/// Domain separator absorbed first into every transcript.
pub const TRANSCRIPT_DOMAIN: &[u8] = b"zkrelay/placeholder/v1";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifierError {
    #[error("Malformed proof: {0}")]
    Codec(#[from] ProofCodecError),

    #[error("Gate configuration error: {0}")]
    Gate(#[from] GateError),

    #[error("Rejected init_params: {reason}")]
    InitParams { reason: String },

    #[error("Public input has {found} elements, init_params declares {expected}")]
    PublicInputLength { expected: usize, found: usize },

    #[error("Proof carries {found} {what}, expected {expected}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Opened public input {index} does not match the supplied value")]
    PublicInputMismatch { index: usize },

    #[error("Opening of column {column} at row {row} does not match its commitment")]
    InvalidOpening { column: usize, row: u64 },

    #[error("Gate '{gate}' is not satisfied at row {row}")]
    GateNotSatisfied { gate: &'static str, row: u64 },
}

impl VerifierError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VerifierError::Codec(e) => e.kind(),
            VerifierError::Gate(e) => e.kind(),
            _ => ErrorKind::ProofInvalid,
        }
    }
}

/// Bounds on what a proof's `init_params` may claim.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifierParams {
    pub min_queries: u32,
    pub max_rows_log2: u32,
}

impl Default for VerifierParams {
    fn default() -> Self {
        Self {
            min_queries: 8,
            max_rows_log2: 20,
        }
    }
}

/// A proof system: a single accept/reject decision over
/// `(proof, public input, gates)`.
pub trait ProofVerifier: Debug + Send + Sync {
    fn verify(&self, bundle: &ProofBundle, public_input: &[Fp], gates: &[Arc<dyn Gate>]) -> bool;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlaceholderVerifier {
    pub params: VerifierParams,
}

impl PlaceholderVerifier {
    pub fn new(params: VerifierParams) -> Self {
        Self { params }
    }

    /// Full verification with the reason for a rejection.
    pub fn check(
        &self,
        bundle: &ProofBundle,
        public_input: &[Fp],
        gates: &[Arc<dyn Gate>],
    ) -> Result<(), VerifierError> {
        let init = &bundle.init_params;
        let rotations = &bundle.columns_rotations;
        self.check_init_params(init, rotations)?;

        if public_input.len() != init.public_input_len as usize {
            return Err(VerifierError::PublicInputLength {
                expected: init.public_input_len as usize,
                found: public_input.len(),
            });
        }

        // Every cell a gate reads must be opened; this is a deployment
        // mistake, so it is checked before touching the proof bytes.
        for gate in gates {
            for cell in gate.cells() {
                rotations.index_of(cell)?;
            }
        }

        let data = ProofData::decode(&bundle.proof)?;
        let columns = init.columns as usize;
        let rows = init.rows();
        let depth = init.rows_log2 as usize;

        expect_len("commitments", columns, data.commitments.len())?;
        expect_len("public openings", public_input.len(), data.public_openings.len())?;
        expect_len("query openings", init.query_count as usize, data.queries.len())?;

        let mut transcript = Transcript::new(TRANSCRIPT_DOMAIN);
        absorb_header(&mut transcript, init, rotations, public_input, &data.commitments);

        let pi_column = init.public_input_column as usize;
        for (index, (opening, expected)) in
            data.public_openings.iter().zip(public_input).enumerate()
        {
            if opening.value != *expected {
                return Err(VerifierError::PublicInputMismatch { index });
            }
            check_opening(opening, &data.commitments[pi_column], depth, pi_column, index as u64)?;
        }

        let theta = transcript.challenge_fp();
        for query in &data.queries {
            let row = transcript.challenge_index(rows);
            expect_len("opened columns", columns, query.columns.len())?;

            for (column, openings) in query.columns.iter().enumerate() {
                let column_rotations = rotations.rotations(column).unwrap_or_default();
                expect_len("column openings", column_rotations.len(), openings.len())?;
                for (opening, &rotation) in openings.iter().zip(column_rotations) {
                    let at = CellRef::new(column, rotation).row_at(row, rows);
                    check_opening(opening, &data.commitments[column], depth, column, at)?;
                }
            }

            let values = query.values();
            let evals = Evaluations::new(&values, rotations);
            for gate in gates {
                if gate.evaluate(&evals, theta)? != Fp::ZERO {
                    return Err(VerifierError::GateNotSatisfied {
                        gate: gate.name(),
                        row,
                    });
                }
            }
        }

        Ok(())
    }

    fn check_init_params(
        &self,
        init: &InitParams,
        rotations: &ColumnsRotations,
    ) -> Result<(), VerifierError> {
        let reject = |reason: String| Err(VerifierError::InitParams { reason });

        if init.rows_log2 == 0 || init.rows_log2 > self.params.max_rows_log2 {
            return reject(format!(
                "rows_log2 {} outside 1..={}",
                init.rows_log2, self.params.max_rows_log2
            ));
        }
        if init.query_count < self.params.min_queries.max(1) {
            return reject(format!(
                "query_count {} below minimum {}",
                init.query_count,
                self.params.min_queries.max(1)
            ));
        }
        if init.columns == 0 || init.columns as usize != rotations.columns() {
            return reject(format!(
                "columns {} but columns_rotations lists {}",
                init.columns,
                rotations.columns()
            ));
        }
        if init.public_input_column >= init.columns {
            return reject(format!(
                "public_input_column {} out of range",
                init.public_input_column
            ));
        }
        if u64::from(init.public_input_len) > init.rows() {
            return reject(format!(
                "public_input_len {} exceeds {} rows",
                init.public_input_len,
                init.rows()
            ));
        }

        let rows = init.rows() as i64;
        for column in 0..rotations.columns() {
            let list = rotations.rotations(column).unwrap_or_default();
            if list.is_empty() {
                return reject(format!("column {column} has no rotations"));
            }
            for (i, rotation) in list.iter().enumerate() {
                if list[..i].contains(rotation) {
                    return reject(format!("column {column} repeats rotation {rotation}"));
                }
                if i64::from(*rotation).abs() >= rows {
                    return reject(format!("column {column} rotation {rotation} spans the trace"));
                }
            }
        }
        Ok(())
    }
}

impl ProofVerifier for PlaceholderVerifier {
    fn verify(&self, bundle: &ProofBundle, public_input: &[Fp], gates: &[Arc<dyn Gate>]) -> bool {
        match self.check(bundle, public_input, gates) {
            Ok(()) => true,
            Err(err) => {
                debug!(error = %err, kind = ?err.kind(), "Proof rejected");
                false
            }
        }
    }
}

/// Absorb everything the prover committed to before challenges are drawn.
/// The prover side calls this too, so the two transcripts agree.
pub(crate) fn absorb_header(
    transcript: &mut Transcript,
    init: &InitParams,
    rotations: &ColumnsRotations,
    public_input: &[Fp],
    commitments: &[[u8; 32]],
) {
    transcript.absorb_u64(b"rows_log2", init.rows_log2.into());
    transcript.absorb_u64(b"columns", init.columns.into());
    transcript.absorb_u64(b"public_input_column", init.public_input_column.into());
    transcript.absorb_u64(b"public_input_len", init.public_input_len.into());
    transcript.absorb_u64(b"query_count", init.query_count.into());
    for list in &rotations.0 {
        let encoded: Vec<u8> = list.iter().flat_map(|r| r.to_le_bytes()).collect();
        transcript.absorb(b"rotations", &encoded);
    }
    for value in public_input {
        transcript.absorb_fp(b"public_input", value);
    }
    for commitment in commitments {
        transcript.absorb(b"commitment", commitment);
    }
}

fn expect_len(what: &'static str, expected: usize, found: usize) -> Result<(), VerifierError> {
    if expected != found {
        return Err(VerifierError::ShapeMismatch {
            what,
            expected,
            found,
        });
    }
    Ok(())
}

fn check_opening(
    opening: &Opening,
    commitment: &[u8; 32],
    depth: usize,
    column: usize,
    row: u64,
) -> Result<(), VerifierError> {
    let leaf = leaf_hash(&opening.value);
    if !verify_merkle_branch(&leaf, &opening.path, depth, row, commitment) {
        return Err(VerifierError::InvalidOpening { column, row });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plonk::prover::{addition_circuit, prove, AdditionCircuit};

    fn circuit() -> AdditionCircuit {
        addition_circuit(&[Fp::from(11u64), Fp::from(22u64), Fp::from(33u64)]).unwrap()
    }

    fn verifier() -> PlaceholderVerifier {
        PlaceholderVerifier::default()
    }

    #[test]
    fn test_honest_proof_accepted() {
        let circuit = circuit();
        let bundle = prove(&circuit.trace, &circuit.gates, &circuit.init_params).unwrap();
        verifier()
            .check(&bundle, &circuit.public_input, &circuit.gates)
            .unwrap();
        assert!(verifier().verify(&bundle, &circuit.public_input, &circuit.gates));
    }

    #[test]
    fn test_every_flipped_byte_rejected() {
        let circuit = circuit();
        let bundle = prove(&circuit.trace, &circuit.gates, &circuit.init_params).unwrap();
        // Stride keeps the test fast while still touching every section.
        for i in (0..bundle.proof.len()).step_by(97).chain([bundle.proof.len() - 1]) {
            let mut tampered = bundle.clone();
            tampered.proof[i] ^= 0x01;
            assert!(
                !verifier().verify(&tampered, &circuit.public_input, &circuit.gates),
                "flipping byte {i} was not detected"
            );
        }
    }

    #[test]
    fn test_wrong_public_input_rejected() {
        let circuit = circuit();
        let bundle = prove(&circuit.trace, &circuit.gates, &circuit.init_params).unwrap();
        let mut public_input = circuit.public_input.clone();
        public_input[1] += Fp::ONE;
        assert_eq!(
            verifier()
                .check(&bundle, &public_input, &circuit.gates)
                .unwrap_err(),
            VerifierError::PublicInputMismatch { index: 1 }
        );
    }

    #[test]
    fn test_missing_public_input_rejected() {
        let circuit = circuit();
        let bundle = prove(&circuit.trace, &circuit.gates, &circuit.init_params).unwrap();
        let err = verifier()
            .check(&bundle, &circuit.public_input[..2], &circuit.gates)
            .unwrap_err();
        assert!(matches!(err, VerifierError::PublicInputLength { .. }));
    }

    #[test]
    fn test_unsatisfied_trace_rejected() {
        let mut circuit = circuit();
        // Corrupt y3 on every row so every query row fails.
        for value in circuit.trace[5].iter_mut() {
            *value += Fp::ONE;
        }
        let bundle = prove(&circuit.trace, &circuit.gates, &circuit.init_params).unwrap();
        let err = verifier()
            .check(&bundle, &circuit.public_input, &circuit.gates)
            .unwrap_err();
        assert!(matches!(
            err,
            VerifierError::GateNotSatisfied {
                gate: "unified_addition",
                ..
            }
        ));
        assert_eq!(err.kind(), ErrorKind::ProofInvalid);
    }

    #[test]
    fn test_too_few_queries_rejected() {
        let circuit = circuit();
        let mut init = circuit.init_params.clone();
        init.query_count = 2;
        let bundle = prove(&circuit.trace, &circuit.gates, &init).unwrap();
        let err = verifier()
            .check(&bundle, &circuit.public_input, &circuit.gates)
            .unwrap_err();
        assert!(matches!(err, VerifierError::InitParams { .. }));
    }

    #[test]
    fn test_gate_reading_unopened_column_is_configuration_error() {
        let circuit = circuit();
        let bundle = prove(&circuit.trace, &circuit.gates, &circuit.init_params).unwrap();
        let misplaced: Arc<dyn Gate> =
            Arc::new(crate::plonk::unified_addition::UnifiedAdditionGate::new(5));
        let err = verifier()
            .check(&bundle, &circuit.public_input, &[misplaced])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_empty_proof_rejected() {
        let circuit = circuit();
        let mut bundle = prove(&circuit.trace, &circuit.gates, &circuit.init_params).unwrap();
        bundle.proof.clear();
        assert!(!verifier().verify(&bundle, &circuit.public_input, &circuit.gates));
    }

    #[test]
    fn test_rotation_list_mismatch_rejected() {
        let circuit = circuit();
        let mut bundle = prove(&circuit.trace, &circuit.gates, &circuit.init_params).unwrap();
        bundle.columns_rotations.0.pop();
        let err = verifier()
            .check(&bundle, &circuit.public_input, &circuit.gates)
            .unwrap_err();
        assert!(matches!(err, VerifierError::InitParams { .. }));
    }

    #[test]
    fn test_verification_is_deterministic() {
        let circuit = circuit();
        let bundle = prove(&circuit.trace, &circuit.gates, &circuit.init_params).unwrap();
        let first = verifier().check(&bundle, &circuit.public_input, &circuit.gates);
        let second = verifier().check(&bundle, &circuit.public_input, &circuit.gates);
        assert_eq!(first, second);
    }
}
