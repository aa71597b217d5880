//! Notifications surfaced to relayers.
//!
//! `HeadUpdate`, `SentMessage` and `ExecutedMessage` are the durable signals
//! a relayer acts on; the rest record administrative changes.

use alloy_primitives::B256;
use serde::Serialize;

use super::handler::StateTransition;
use crate::types::primitives::hex_bytes32;
use crate::types::{ChainId, LightClientHeader, Message, OracleRequest};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all_fields = "camelCase")]
pub enum Event {
    /// The light client accepted a step.
    HeadUpdate {
        source_chain_id: ChainId,
        header: LightClientHeader,
    },
    /// A sync committee was installed for `period`.
    SyncCommitteeRotated {
        period: u64,
        #[serde(with = "hex_bytes32")]
        commitment: [u8; 32],
    },
    /// An outbound message was queued.
    SentMessage { message: Message, message_hash: B256 },
    /// An inbound message was delivered to its target.
    ExecutedMessage {
        source_chain_id: ChainId,
        nonce: u64,
        message_hash: B256,
    },
    /// The oracle committed a request for relay.
    RequestCommitted {
        request: OracleRequest,
        message_hash: B256,
    },
    /// A verifier handler accepted an update.
    TransitionAccepted { transition: StateTransition },
    /// The transition manager was pointed at another oracle.
    OracleRebound {
        previous: Option<B256>,
        current: B256,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::HeadUpdate { .. } => "HeadUpdate",
            Event::SyncCommitteeRotated { .. } => "SyncCommitteeRotated",
            Event::SentMessage { .. } => "SentMessage",
            Event::ExecutedMessage { .. } => "ExecutedMessage",
            Event::RequestCommitted { .. } => "RequestCommitted",
            Event::TransitionAccepted { .. } => "TransitionAccepted",
            Event::OracleRebound { .. } => "OracleRebound",
        }
    }
}

/// Events emitted by one component, oldest first.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    /// Hand every pending event to the caller.
    pub fn drain(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn last(&self) -> Option<&Event> {
        self.events.last()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn count(&self, name: &str) -> usize {
        self.events.iter().filter(|e| e.name() == name).count()
    }
}
