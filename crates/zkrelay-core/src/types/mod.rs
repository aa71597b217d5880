pub mod execution;
pub mod light_client;
pub mod message;
pub mod primitives;

pub use execution::{AccountState, MessageInclusion};
pub use light_client::{LightClientConfig, LightClientHeader, RotateUpdate, StepUpdate};
pub use message::{Message, MessageError, OracleRequest, MESSAGE_VERSION};
pub use primitives::{normalize_address, AddressInput, ChainId, ProofSystemId};
