//! Trusted execution state roots per source chain.
//!
//! Written only by the light client (or an administrator wiring a mock);
//! read by every message verifier.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::debug;

use crate::error::ErrorKind;
use crate::sync::Shared;
use crate::types::ChainId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolStateError {
    #[error("Slot {slot} already has a different state root")]
    SlotAlreadyRecorded { slot: u64 },

    #[error("Head cannot move back from {head} to {slot}")]
    HeadRegression { slot: u64, head: u64 },

    #[error("No state root recorded for slot {slot}")]
    SlotNotRecorded { slot: u64 },
}

impl ProtocolStateError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProtocolStateError::SlotAlreadyRecorded { .. }
            | ProtocolStateError::HeadRegression { .. } => ErrorKind::StaleOrOutOfOrderUpdate,
            ProtocolStateError::SlotNotRecorded { .. } => ErrorKind::Configuration,
        }
    }
}

/// `{slot → stateRoot}` plus a head pointer for one source chain.
///
/// A recorded slot never changes its root and the head only moves forward.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProtocolState {
    source_chain_id: ChainId,
    roots: BTreeMap<u64, [u8; 32]>,
    head: Option<u64>,
}

pub type SharedProtocolState = Shared<ProtocolState>;

impl ProtocolState {
    pub fn new(source_chain_id: ChainId) -> Self {
        Self {
            source_chain_id,
            roots: BTreeMap::new(),
            head: None,
        }
    }

    pub fn source_chain_id(&self) -> ChainId {
        self.source_chain_id
    }

    /// Record the state root of `slot`. Recording the same root again is a
    /// no-op; a different root is rejected.
    pub fn add_slot(&mut self, slot: u64, state_root: [u8; 32]) -> Result<(), ProtocolStateError> {
        match self.roots.get(&slot) {
            Some(existing) if *existing == state_root => Ok(()),
            Some(_) => Err(ProtocolStateError::SlotAlreadyRecorded { slot }),
            None => {
                self.roots.insert(slot, state_root);
                debug!(chain = self.source_chain_id, slot, "state root recorded");
                Ok(())
            }
        }
    }

    /// Move the head to an already recorded slot.
    pub fn set_head(&mut self, slot: u64) -> Result<(), ProtocolStateError> {
        if !self.roots.contains_key(&slot) {
            return Err(ProtocolStateError::SlotNotRecorded { slot });
        }
        match self.head {
            Some(head) if slot < head => Err(ProtocolStateError::HeadRegression { slot, head }),
            Some(head) if slot == head => Ok(()),
            _ => {
                self.head = Some(slot);
                Ok(())
            }
        }
    }

    /// `add_slot` then `set_head`, applied together or not at all.
    pub fn record(&mut self, slot: u64, state_root: [u8; 32]) -> Result<(), ProtocolStateError> {
        if let Some(head) = self.head {
            if slot < head {
                return Err(ProtocolStateError::HeadRegression { slot, head });
            }
        }
        if matches!(self.roots.get(&slot), Some(existing) if *existing != state_root) {
            return Err(ProtocolStateError::SlotAlreadyRecorded { slot });
        }
        self.add_slot(slot, state_root)?;
        self.set_head(slot)
    }

    pub fn head(&self) -> Option<u64> {
        self.head
    }

    pub fn state_root(&self, slot: u64) -> Option<[u8; 32]> {
        self.roots.get(&slot).copied()
    }

    pub fn head_state_root(&self) -> Option<[u8; 32]> {
        self.head.and_then(|slot| self.state_root(slot))
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}
