//! Gate-based proof verification.
//!
//! - `gate` / `unified_addition`: the gate engine.
//! - `verifier`: accepts or rejects a `(proof, public input, gates)` triple.
//! - `proof` / `merkle` / `transcript`: the bundle format and what the
//!   verifier recomputes from it.
//! - `prover`: produces accepted bundles for tests and simulations.

pub mod field;
pub mod gate;
pub mod merkle;
pub mod proof;
pub mod prover;
pub mod transcript;
pub mod unified_addition;
pub mod verifier;

pub use field::{split_word, Fp};
pub use gate::{evaluate, CellRef, ColumnsRotations, Evaluations, Gate, GateError, GateSet};
pub use proof::{InitParams, ProofBundle, ProofCodecError};
pub use unified_addition::UnifiedAdditionGate;
pub use verifier::{PlaceholderVerifier, ProofVerifier, VerifierError, VerifierParams};
