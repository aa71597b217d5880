pub mod fixtures;
pub mod light_client;
pub mod protocol_state;
pub mod sync_committee;

pub use light_client::{
    LightClient, LightClientError, LightClientStatus, RotateOutcome, StepOutcome,
};
pub use protocol_state::{ProtocolState, ProtocolStateError, SharedProtocolState};
pub use sync_committee::{rotate_public_input, step_public_input, SyncCommitteeSet};
