use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::protocol_state::{ProtocolStateError, SharedProtocolState};
use super::sync_committee::{rotate_public_input, step_public_input, SyncCommitteeSet};
use crate::bridge::events::{Event, EventLog};
use crate::config::ConfigError;
use crate::error::ErrorKind;
use crate::plonk::{Gate, GateSet, ProofVerifier};
use crate::sync;
use crate::types::{LightClientConfig, LightClientHeader, RotateUpdate, StepUpdate};

/// Errors from `step` and `rotate`. Each one leaves the light client and
/// its protocol state exactly as they were.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LightClientError {
    #[error("Finalized slot {finalized_slot} is after attested slot {attested_slot}")]
    FinalizedAfterAttested {
        attested_slot: u64,
        finalized_slot: u64,
    },

    #[error("No sync committee for period {period} (current period {current_period})")]
    UnknownSyncCommittee { period: u64, current_period: u64 },

    #[error("Insufficient participation: {participation} (need at least {threshold})")]
    InsufficientParticipation { participation: u64, threshold: u64 },

    #[error("Update at slot {slot} is older than head slot {head}")]
    StaleUpdate { slot: u64, head: u64 },

    #[error("Proof verification failed")]
    ProofVerificationFailed,

    #[error("Attested slot {slot} already has a different header")]
    ConflictingHeader { slot: u64 },

    #[error("Rotation to period {period} out of order, expected period {expected}")]
    RotationOutOfOrder { period: u64, expected: u64 },

    #[error("Period {period} already has a different sync committee")]
    ConflictingSyncCommittee { period: u64 },

    #[error(transparent)]
    ProtocolState(#[from] ProtocolStateError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl LightClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LightClientError::FinalizedAfterAttested { .. } => ErrorKind::Malformed,
            LightClientError::InsufficientParticipation { .. }
            | LightClientError::ProofVerificationFailed => ErrorKind::ProofInvalid,
            LightClientError::UnknownSyncCommittee { .. }
            | LightClientError::StaleUpdate { .. }
            | LightClientError::ConflictingHeader { .. }
            | LightClientError::RotationOutOfOrder { .. }
            | LightClientError::ConflictingSyncCommittee { .. } => {
                ErrorKind::StaleOrOutOfOrderUpdate
            }
            LightClientError::ProtocolState(e) => e.kind(),
            LightClientError::Config(e) => e.kind(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LightClientStatus {
    /// Genesis committee installed, no header accepted yet.
    Uninitialized,
    Synced,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// The head moved to this header.
    Advanced(LightClientHeader),
    /// The update was already accepted; nothing changed.
    Duplicate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RotateOutcome {
    Installed { period: u64 },
    Duplicate,
}

/// The trusted header chain of one source chain.
///
/// Owns the sync-committee commitments and the accepted headers. Every
/// accepted step records the finalized execution state root in the shared
/// [`ProtocolState`](super::protocol_state::ProtocolState).
pub struct LightClient {
    config: LightClientConfig,
    verifier: Arc<dyn ProofVerifier>,
    step_gates: GateSet,
    rotate_gates: GateSet,
    committees: SyncCommitteeSet,
    head: Option<LightClientHeader>,
    /// Accepted headers by attested slot.
    headers: BTreeMap<u64, LightClientHeader>,
    /// Committee each accepted header was proven against, by attested slot.
    header_committees: BTreeMap<u64, [u8; 32]>,
    /// Finalized header roots by finalized slot.
    finalized_roots: BTreeMap<u64, [u8; 32]>,
    protocol_state: SharedProtocolState,
    events: EventLog,
}

impl fmt::Debug for LightClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LightClient")
            .field("source_chain_id", &self.config.source_chain_id)
            .field("head", &self.head)
            .field("committees", &self.committees)
            .finish_non_exhaustive()
    }
}

impl LightClient {
    /// Create a light client trusting the genesis committee of `config`.
    ///
    /// `protocol_state` must track the same source chain.
    pub fn new(
        config: LightClientConfig,
        verifier: Arc<dyn ProofVerifier>,
        step_gates: GateSet,
        rotate_gates: GateSet,
        protocol_state: SharedProtocolState,
    ) -> Result<Self, LightClientError> {
        config.validate()?;
        let tracked = sync::read(&protocol_state).source_chain_id();
        if tracked != config.source_chain_id {
            return Err(ConfigError::ChainMismatch {
                expected: config.source_chain_id,
                found: tracked,
            }
            .into());
        }

        let mut committees = SyncCommitteeSet::new();
        committees.insert(config.sync_committee_period, config.sync_committee_poseidon);
        info!(
            chain = config.source_chain_id,
            period = config.sync_committee_period,
            "Light client initialized"
        );

        Ok(Self {
            config,
            verifier,
            step_gates,
            rotate_gates,
            committees,
            head: None,
            headers: BTreeMap::new(),
            header_committees: BTreeMap::new(),
            finalized_roots: BTreeMap::new(),
            protocol_state,
            events: EventLog::new(),
        })
    }

    /// Advance the header chain with a proven update.
    ///
    /// Checks run in order and the first failure is returned:
    /// 1. Slot sanity (finalized not after attested)
    ///
    /// A header identical to an accepted one is re-verified against the
    /// committee it was accepted with and reported as `Duplicate`, wherever
    /// the head is now. Otherwise:
    ///
    /// 2. A committee is installed for the attested period, which must be
    ///    the current period or the next one
    /// 3. Participation meets the finality threshold
    /// 4. The update does not go behind the head
    /// 5. The proof verifies with the committee, chain and header as public input
    /// 6. The attested slot and finalized slot carry no other header
    ///
    /// Only then is the finalized state root recorded and the head moved.
    pub fn step(&mut self, update: &StepUpdate) -> Result<StepOutcome, LightClientError> {
        let header = update.header();

        // 1. Structural sanity
        if header.finalized_slot > header.attested_slot {
            return Err(LightClientError::FinalizedAfterAttested {
                attested_slot: header.attested_slot,
                finalized_slot: header.finalized_slot,
            });
        }

        if self.headers.get(&header.attested_slot) == Some(&header) {
            if let Some(committee) = self.header_committees.get(&header.attested_slot) {
                self.verify_step(committee, &header, update)?;
                debug!(attested_slot = header.attested_slot, "Duplicate step ignored");
                return Ok(StepOutcome::Duplicate);
            }
        }

        // 2. Committee for the attested period
        let current_period = self.current_period();
        let period = self.config.period_at_slot(header.attested_slot);
        let next_period = current_period.checked_add(1);
        let committee = match self.committees.get(period) {
            Some(c) if period == current_period || Some(period) == next_period => c,
            _ => {
                return Err(LightClientError::UnknownSyncCommittee {
                    period,
                    current_period,
                })
            }
        };

        // 3. Participation
        if header.participation < self.config.finality_threshold {
            return Err(LightClientError::InsufficientParticipation {
                participation: header.participation,
                threshold: self.config.finality_threshold,
            });
        }

        // 4. Ordering
        if let Some(head) = &self.head {
            if header.attested_slot < head.attested_slot {
                return Err(LightClientError::StaleUpdate {
                    slot: header.attested_slot,
                    head: head.attested_slot,
                });
            }
            if header.finalized_slot < head.finalized_slot {
                return Err(LightClientError::StaleUpdate {
                    slot: header.finalized_slot,
                    head: head.finalized_slot,
                });
            }
        }

        // 5. The proof
        self.verify_step(&committee, &header, update)?;

        // 6. Conflicts
        if self.headers.contains_key(&header.attested_slot) {
            return Err(LightClientError::ConflictingHeader {
                slot: header.attested_slot,
            });
        }
        if matches!(
            self.finalized_roots.get(&header.finalized_slot),
            Some(root) if *root != header.finalized_header_root
        ) {
            return Err(LightClientError::ConflictingHeader {
                slot: header.finalized_slot,
            });
        }

        // 7. Commit. The protocol state write is the only fallible step and
        //    is itself all-or-nothing.
        sync::write(&self.protocol_state)
            .record(header.finalized_slot, header.execution_state_root)?;

        if period > current_period {
            self.committees.prune_below(period);
        }
        self.finalized_roots
            .insert(header.finalized_slot, header.finalized_header_root);
        self.headers.insert(header.attested_slot, header.clone());
        self.header_committees.insert(header.attested_slot, committee);
        self.head = Some(header.clone());
        self.events.emit(Event::HeadUpdate {
            source_chain_id: self.config.source_chain_id,
            header: header.clone(),
        });
        info!(
            chain = self.config.source_chain_id,
            attested_slot = header.attested_slot,
            finalized_slot = header.finalized_slot,
            participation = header.participation,
            "Light client head advanced"
        );
        Ok(StepOutcome::Advanced(header))
    }

    fn verify_step(
        &self,
        committee: &[u8; 32],
        header: &LightClientHeader,
        update: &StepUpdate,
    ) -> Result<(), LightClientError> {
        let public_input =
            step_public_input(committee, &self.config.genesis_validators_root, header);
        if !self
            .verifier
            .verify(&update.proof, &public_input, &self.step_gates)
        {
            warn!(
                chain = self.config.source_chain_id,
                attested_slot = header.attested_slot,
                "Step proof rejected"
            );
            return Err(LightClientError::ProofVerificationFailed);
        }
        Ok(())
    }

    /// Install the sync committee of the next period.
    ///
    /// The proof is checked against the current committee. Periods cannot be
    /// skipped.
    pub fn rotate(&mut self, update: &RotateUpdate) -> Result<RotateOutcome, LightClientError> {
        let current_period = self.current_period();
        let expected = current_period
            .checked_add(1)
            .ok_or(LightClientError::RotationOutOfOrder {
                period: update.period,
                expected: current_period,
            })?;
        if update.period != expected {
            return Err(LightClientError::RotationOutOfOrder {
                period: update.period,
                expected,
            });
        }
        let current = self
            .committees
            .get(current_period)
            .ok_or(LightClientError::UnknownSyncCommittee {
                period: current_period,
                current_period,
            })?;

        let public_input = rotate_public_input(
            &current,
            &update.sync_committee_poseidon,
            update.period,
            &self.config.genesis_validators_root,
        );
        if !self
            .verifier
            .verify(&update.proof, &public_input, &self.rotate_gates)
        {
            warn!(period = update.period, "Rotate proof rejected");
            return Err(LightClientError::ProofVerificationFailed);
        }

        match self
            .committees
            .insert(update.period, update.sync_committee_poseidon)
        {
            None => {
                self.events.emit(Event::SyncCommitteeRotated {
                    period: update.period,
                    commitment: update.sync_committee_poseidon,
                });
                info!(period = update.period, "Sync committee rotated");
                Ok(RotateOutcome::Installed {
                    period: update.period,
                })
            }
            Some(existing) if existing == update.sync_committee_poseidon => {
                Ok(RotateOutcome::Duplicate)
            }
            Some(_) => Err(LightClientError::ConflictingSyncCommittee {
                period: update.period,
            }),
        }
    }

    pub fn status(&self) -> LightClientStatus {
        if self.head.is_some() {
            LightClientStatus::Synced
        } else {
            LightClientStatus::Uninitialized
        }
    }

    /// Period of the head, or the genesis committee's period before the
    /// first step.
    pub fn current_period(&self) -> u64 {
        match &self.head {
            Some(head) => self.config.period_at_slot(head.attested_slot),
            None => self.config.sync_committee_period,
        }
    }

    /// Source-chain slot in progress at unix time `now`.
    pub fn current_slot(&self, now: u64) -> u64 {
        self.config.slot_at(now)
    }

    pub fn head(&self) -> Option<&LightClientHeader> {
        self.head.as_ref()
    }

    pub fn header(&self, attested_slot: u64) -> Option<&LightClientHeader> {
        self.headers.get(&attested_slot)
    }

    pub fn finalized_header_root(&self, finalized_slot: u64) -> Option<[u8; 32]> {
        self.finalized_roots.get(&finalized_slot).copied()
    }

    pub fn execution_state_root(&self, finalized_slot: u64) -> Option<[u8; 32]> {
        sync::read(&self.protocol_state).state_root(finalized_slot)
    }

    pub fn sync_committee(&self, period: u64) -> Option<[u8; 32]> {
        self.committees.get(period)
    }

    pub fn config(&self) -> &LightClientConfig {
        &self.config
    }

    pub fn protocol_state(&self) -> &SharedProtocolState {
        &self.protocol_state
    }

    pub fn verifier(&self) -> &Arc<dyn ProofVerifier> {
        &self.verifier
    }

    /// Point step and rotate verification at another proof system.
    pub fn set_verifier(&mut self, verifier: Arc<dyn ProofVerifier>) {
        info!(chain = self.config.source_chain_id, ?verifier, "Verifier replaced");
        self.verifier = verifier;
    }

    pub fn step_gates(&self) -> &[Arc<dyn Gate>] {
        &self.step_gates
    }

    pub fn set_step_gates(&mut self, gates: GateSet) {
        info!(gates = gates.len(), "Step gates replaced");
        self.step_gates = gates;
    }

    pub fn rotate_gates(&self) -> &[Arc<dyn Gate>] {
        &self.rotate_gates
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        self.events.drain()
    }
}
