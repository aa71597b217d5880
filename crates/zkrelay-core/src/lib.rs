//! # zkrelay Core
//!
//! Cross-chain message relay secured by succinct-proof light clients.
//!
//! This crate contains **no networking code**. Every piece of source-chain
//! data passes through these checks before a message is delivered.
//!
//! ## Trust Model
//!
//! - **Gate verification** (`plonk` module): accepts a proof only if every
//!   committed column opens consistently and every gate (including the
//!   unified elliptic-curve addition gate) evaluates to zero at the sampled
//!   rows. Verification is a pure function of its inputs.
//!
//! - **Light client** (`consensus` module): advances the trusted header chain
//!   only on a proof whose public input binds the active sync-committee
//!   commitment and the header. Trusts that the committee is honest, as the
//!   source chain itself does.
//!
//! - **Inclusion proofs** (`execution` module): verifies Merkle-Patricia
//!   account and storage proofs. Zero trust assumptions beyond the state root
//!   recorded by the light client.
//!
//! - **Routing** (`bridge` module): turns verified state into exactly-once
//!   message execution. Every failure is an atomic rejection.
//!
//! ## Usage
//!
//! ```ignore
//! use zkrelay_core::consensus::{LightClient, ProtocolState};
//! use zkrelay_core::bridge::{Router, TransitionManager, Oracle};
//! ```

pub mod bridge;
pub mod config;
pub mod consensus;
pub mod error;
pub mod execution;
pub mod plonk;
pub mod sync;
pub mod types;

// Re-export commonly used types for convenience
pub use bridge::{
    Event, LightClientHandler, Oracle, Router, SourceAmb, StateTransition, TargetAmb,
    TransitionManager,
};
pub use config::{ConfigError, DeploySettings};
pub use consensus::{LightClient, LightClientError, ProtocolState, StepOutcome};
pub use error::ErrorKind;
pub use execution::{verify_account_proof, verify_contract_storage, verify_storage_proof};
pub use plonk::{PlaceholderVerifier, ProofVerifier, VerifierParams};
pub use types::{
    LightClientConfig, LightClientHeader, Message, OracleRequest, ProofSystemId, StepUpdate,
};
