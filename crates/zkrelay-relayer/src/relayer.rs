//! The relay loop.
//!
//! Observations arrive on a channel in any order and possibly more than
//! once. Each one is submitted to the destination components and classified:
//!
//! - **Applied**: the destination state changed.
//! - **Absorbed**: already done, or superseded by a newer update.
//! - **Deferred**: references state the destination does not have yet. Held
//!   and resubmitted after the next applied observation, or on the retry tick.
//! - **Rejected**: terminal for that observation.
//!
//! The loop never needs ordering from its producers. Replay guards and the
//! light client's monotonic head make every resubmission safe.

use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};
use zkrelay_core::consensus::{LightClientError, RotateOutcome};
use zkrelay_core::sync::{self, Shared};
use zkrelay_core::{ErrorKind, LightClient, Router, StepOutcome, TargetAmb, TransitionManager};

use crate::observation::Observation;

/// Default pause between resubmissions of deferred observations.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(12);

/// How one submission ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    Applied,
    Absorbed,
    Deferred,
    Rejected(ErrorKind),
}

/// Totals over the lifetime of a relayer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RelayReport {
    pub applied: usize,
    pub absorbed: usize,
    pub rejected: usize,
    /// Observations still waiting on destination state when the loop ended.
    pub pending: usize,
}

struct RouterBinding {
    router: Shared<Router>,
    transitions: Shared<TransitionManager>,
}

/// Feeds observations into one destination chain's components.
pub struct Relayer {
    light_client: Shared<LightClient>,
    target_amb: Option<Shared<TargetAmb>>,
    router: Option<RouterBinding>,
    retry_interval: Duration,
    pending: Vec<Observation>,
    report: RelayReport,
}

impl fmt::Debug for Relayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relayer")
            .field("target_amb", &self.target_amb.is_some())
            .field("router", &self.router.is_some())
            .field("retry_interval", &self.retry_interval)
            .field("pending", &self.pending.len())
            .field("report", &self.report)
            .finish()
    }
}

impl Relayer {
    pub fn new(light_client: Shared<LightClient>) -> Self {
        Self {
            light_client,
            target_amb: None,
            router: None,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            pending: Vec::new(),
            report: RelayReport::default(),
        }
    }

    pub fn with_target_amb(mut self, target_amb: Shared<TargetAmb>) -> Self {
        self.target_amb = Some(target_amb);
        self
    }

    pub fn with_router(
        mut self,
        router: Shared<Router>,
        transitions: Shared<TransitionManager>,
    ) -> Self {
        self.router = Some(RouterBinding {
            router,
            transitions,
        });
        self
    }

    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    pub fn pending(&self) -> &[Observation] {
        &self.pending
    }

    pub fn report(&self) -> RelayReport {
        RelayReport {
            pending: self.pending.len(),
            ..self.report.clone()
        }
    }

    /// Submit once, without touching the pending queue or the totals.
    pub fn submit(&self, observation: &Observation) -> Disposition {
        match observation {
            Observation::Step(update) => {
                let result = sync::write(&self.light_client).step(update);
                match result {
                    Ok(StepOutcome::Advanced(header)) => {
                        debug!(slot = header.finalized_slot, "Step relayed");
                        Disposition::Applied
                    }
                    Ok(StepOutcome::Duplicate) => Disposition::Absorbed,
                    Err(err) => self.classify_light_client(&err),
                }
            }
            Observation::Rotate(update) => {
                let result = sync::write(&self.light_client).rotate(update);
                match result {
                    Ok(RotateOutcome::Installed { period }) => {
                        debug!(period, "Rotation relayed");
                        Disposition::Applied
                    }
                    Ok(RotateOutcome::Duplicate) => Disposition::Absorbed,
                    Err(err) => self.classify_light_client(&err),
                }
            }
            Observation::Inclusion(inclusion) => {
                let Some(target_amb) = &self.target_amb else {
                    warn!("Inclusion observed but no target AMB is bound");
                    return Disposition::Rejected(ErrorKind::UnregisteredHandler);
                };
                let result = sync::write(target_amb).execute_inclusion(inclusion);
                match result {
                    Ok(()) => Disposition::Applied,
                    Err(err) => classify(err.kind(), &err),
                }
            }
            Observation::Routed { message } => {
                let Some(binding) = &self.router else {
                    warn!("Routed message observed but no router is bound");
                    return Disposition::Rejected(ErrorKind::UnregisteredHandler);
                };
                let mut transitions = sync::write(&binding.transitions);
                let result = sync::write(&binding.router).execute_message(message, &mut transitions);
                match result {
                    Ok(response) => {
                        debug!(response = %hex::encode(&response), "Request relayed");
                        Disposition::Applied
                    }
                    Err(err) => classify(err.kind(), &err),
                }
            }
        }
    }

    /// Light-client errors that a later rotation or step can cure are
    /// deferred; an update behind the head is absorbed.
    fn classify_light_client(&self, err: &LightClientError) -> Disposition {
        let ahead = |period: &u64, reference: &u64| {
            if period > reference {
                Disposition::Deferred
            } else {
                Disposition::Absorbed
            }
        };
        match err {
            LightClientError::UnknownSyncCommittee {
                period,
                current_period,
            } if period != current_period => ahead(period, current_period),
            LightClientError::RotationOutOfOrder { period, expected } => ahead(period, expected),
            LightClientError::StaleUpdate { .. } => Disposition::Absorbed,
            _ => classify(err.kind(), err),
        }
    }

    /// Submit, then update the totals and the pending queue.
    pub fn handle(&mut self, observation: Observation) -> Disposition {
        let disposition = self.submit(&observation);
        self.settle(&observation, disposition);
        match disposition {
            Disposition::Deferred => self.pending.push(observation),
            Disposition::Applied => self.retry_pending(),
            Disposition::Absorbed | Disposition::Rejected(_) => {}
        }
        disposition
    }

    /// Resubmit every deferred observation, repeating while a pass applies
    /// something.
    pub fn retry_pending(&mut self) {
        loop {
            let mut progressed = false;
            for observation in std::mem::take(&mut self.pending) {
                let disposition = self.submit(&observation);
                self.settle(&observation, disposition);
                match disposition {
                    Disposition::Deferred => self.pending.push(observation),
                    Disposition::Applied => progressed = true,
                    Disposition::Absorbed | Disposition::Rejected(_) => {}
                }
            }
            if !progressed || self.pending.is_empty() {
                return;
            }
        }
    }

    fn settle(&mut self, observation: &Observation, disposition: Disposition) {
        let kind = observation.label();
        match disposition {
            Disposition::Applied => self.report.applied += 1,
            Disposition::Absorbed => {
                debug!(kind, "Observation already applied");
                self.report.absorbed += 1;
            }
            Disposition::Deferred => debug!(kind, "Observation deferred"),
            Disposition::Rejected(error_kind) => {
                warn!(kind, ?error_kind, "Observation rejected");
                self.report.rejected += 1;
            }
        }
    }

    /// Drain `observations` until every sender is dropped.
    ///
    /// Deferred observations are retried after each applied one and on every
    /// retry tick. Whatever is still deferred at the end is counted in
    /// [`RelayReport::pending`].
    pub async fn run(mut self, mut observations: mpsc::Receiver<Observation>) -> RelayReport {
        let mut retry = time::interval(self.retry_interval);
        retry.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(retry_interval = ?self.retry_interval, "Relayer started");

        loop {
            tokio::select! {
                received = observations.recv() => match received {
                    Some(observation) => {
                        self.handle(observation);
                    }
                    None => break,
                },
                _ = retry.tick(), if !self.pending.is_empty() => self.retry_pending(),
            }
        }

        self.retry_pending();
        let report = self.report();
        info!(
            applied = report.applied,
            absorbed = report.absorbed,
            rejected = report.rejected,
            pending = report.pending,
            "Relayer stopped"
        );
        report
    }

    pub fn spawn(self, observations: mpsc::Receiver<Observation>) -> JoinHandle<RelayReport> {
        tokio::spawn(self.run(observations))
    }
}

fn classify(kind: ErrorKind, err: &dyn std::error::Error) -> Disposition {
    match kind {
        kind if kind.is_retryable() => Disposition::Deferred,
        ErrorKind::ReplayedMessage => Disposition::Absorbed,
        kind => {
            debug!(%err, "Submission failed");
            Disposition::Rejected(kind)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use zkrelay_core::consensus::fixtures::{header_at, prove_rotate, prove_step};
    use zkrelay_core::consensus::ProtocolState;
    use zkrelay_core::plonk::prover::addition_gates;
    use zkrelay_core::types::LightClientConfig;
    use zkrelay_core::PlaceholderVerifier;

    const PERIOD_ZERO: [u8; 32] = [2; 32];
    const PERIOD_ONE: [u8; 32] = [3; 32];

    fn config() -> LightClientConfig {
        LightClientConfig {
            genesis_validators_root: [1; 32],
            genesis_time: 0,
            seconds_per_slot: 12,
            slots_per_period: 64,
            sync_committee_period: 0,
            sync_committee_poseidon: PERIOD_ZERO,
            source_chain_id: 5,
            finality_threshold: 10,
        }
    }

    fn relayer() -> Relayer {
        let light_client = LightClient::new(
            config(),
            Arc::new(PlaceholderVerifier::default()),
            addition_gates(),
            addition_gates(),
            sync::shared(ProtocolState::new(5)),
        )
        .unwrap();
        Relayer::new(sync::shared(light_client))
    }

    fn step(attested_slot: u64, committee: &[u8; 32]) -> Observation {
        Observation::Step(prove_step(&config(), committee, &header_at(attested_slot, 20)).unwrap())
    }

    #[test]
    fn test_duplicate_and_stale_steps_absorbed() {
        let mut relayer = relayer();
        assert_eq!(relayer.handle(step(30, &PERIOD_ZERO)), Disposition::Applied);
        assert_eq!(relayer.handle(step(30, &PERIOD_ZERO)), Disposition::Absorbed);
        assert_eq!(relayer.handle(step(10, &PERIOD_ZERO)), Disposition::Absorbed);
        assert_eq!(
            relayer.report(),
            RelayReport {
                applied: 1,
                absorbed: 2,
                rejected: 0,
                pending: 0,
            }
        );
    }

    #[test]
    fn test_step_waits_for_rotation() {
        let mut relayer = relayer();
        // A step in period 1 arrives before the rotation that installs its committee.
        assert_eq!(relayer.handle(step(70, &PERIOD_ONE)), Disposition::Deferred);
        assert_eq!(relayer.pending().len(), 1);

        let rotate = prove_rotate(&config(), &PERIOD_ZERO, &PERIOD_ONE, 1).unwrap();
        assert_eq!(relayer.handle(Observation::Rotate(rotate)), Disposition::Applied);
        assert!(relayer.pending().is_empty());
        assert_eq!(relayer.report().applied, 2);
        let head = sync::read(&relayer.light_client).head().map(|h| h.attested_slot);
        assert_eq!(head, Some(70));
    }

    #[test]
    fn test_unbound_destinations_rejected() {
        let mut relayer = relayer();
        let disposition = relayer.handle(Observation::Routed {
            message: vec![0xFF],
        });
        assert_eq!(disposition, Disposition::Rejected(ErrorKind::UnregisteredHandler));
        assert_eq!(relayer.report().rejected, 1);
    }

    #[tokio::test]
    async fn test_run_until_senders_dropped() {
        let (tx, rx) = mpsc::channel(8);
        let handle = relayer()
            .with_retry_interval(Duration::from_millis(5))
            .spawn(rx);

        tx.send(step(70, &PERIOD_ONE)).await.unwrap();
        tx.send(step(30, &PERIOD_ZERO)).await.unwrap();
        drop(tx);

        // Nothing ever installs the period 1 committee.
        let report = handle.await.unwrap();
        assert_eq!(report.applied, 1);
        assert_eq!(report.pending, 1);
    }
}
