//! # zkrelay Relayer
//!
//! The off-chain half of the relay. It watches source-chain events, turns
//! them into proof-carrying observations and submits them to a destination
//! chain's light client, target AMB and router.
//!
//! Delivery is at-least-once with no ordering guarantee. The relayer keeps no
//! state of its own beyond a queue of observations that reference slots or
//! periods the destination has not reached yet; correctness rests entirely on
//! the replay guards in `zkrelay-core`.

pub mod logging;
pub mod observation;
pub mod relayer;

pub use logging::init_logging;
pub use observation::{observe_sent_messages, Observation};
pub use relayer::{Disposition, RelayReport, Relayer, DEFAULT_RETRY_INTERVAL};
