//! Cross-chain message routing.
//!
//! Two delivery paths sit on top of a verified light-client state:
//!
//! - **Oracle path**: [`Oracle`] commits a request carrying a proof blob,
//!   [`Router::execute_message`] has the [`TransitionManager`] verify the blob
//!   with the handler registered for its proof system and hands the request
//!   to the destination oracle's handler pair.
//! - **AMB path**: [`SourceAmb`] stores message hashes in contract storage,
//!   [`TargetAmb`] executes a message only with account and storage proofs
//!   against a state root held by `ProtocolState`.
//!
//! Both paths are replay-guarded by message hash and change nothing when a
//! call fails.

pub mod amb;
pub mod events;
pub mod handler;
pub mod oracle;
pub mod router;
pub mod transition_manager;

pub use amb::{message_storage_slot, AmbError, SourceAmb, TargetAmb};
pub use events::{Event, EventLog};
pub use handler::{
    HandlerError, LightClientHandler, MessageReceiver, RequestHandler, ResponseHandler,
    StateTransition, VerifierHandler,
};
pub use oracle::{CommitRequest, Oracle, OracleError};
pub use router::{Router, RouterError};
pub use transition_manager::{TransitionError, TransitionManager};
