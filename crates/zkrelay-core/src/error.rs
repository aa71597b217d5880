use serde::{Deserialize, Serialize};

/// Coarse classification shared by every error in this crate.
///
/// Relayers branch on this rather than on module-specific variants: a
/// `FutureSlotReference` is worth retrying once the head moves, a
/// `ReplayedMessage` means the work is already done, everything else is a
/// terminal rejection of that particular submission.
///
/// All of these are atomic rejections. The component that returned the error
/// has not changed any of its state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// A succinct proof failed verification.
    ProofInvalid,
    /// The update's slot or period does not extend the trusted chain.
    StaleOrOutOfOrderUpdate,
    /// No verifier, request or response handler is bound for the key.
    UnregisteredHandler,
    /// The message was already executed.
    ReplayedMessage,
    /// An account or storage proof does not match the recorded state root.
    InvalidInclusionProof,
    /// The proof references a slot beyond the current head.
    FutureSlotReference,
    /// Parameters or indices are inconsistent (a deployment mistake, not an attack).
    Configuration,
    /// Input could not be decoded.
    Malformed,
    /// The target handler rejected the delivery.
    ExecutionFailed,
}

impl ErrorKind {
    /// Whether resubmitting the same input later can succeed without changes.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::FutureSlotReference)
    }
}
