//! Fiat–Shamir transcript over SHA256.
//!
//! Both sides absorb the same data in the same order; every challenge is a
//! hash of the running state and a squeeze counter, so the verifier's
//! challenges are a deterministic function of the proof and public input.

use pasta_curves::group::ff::FromUniformBytes;
use sha2::{Digest, Sha256};

use super::field::{fp_to_bytes, Fp};

#[derive(Clone, Debug)]
pub struct Transcript {
    state: [u8; 32],
    squeezed: u64,
}

impl Transcript {
    pub fn new(domain: &[u8]) -> Self {
        let mut transcript = Self {
            state: [0u8; 32],
            squeezed: 0,
        };
        transcript.absorb(b"domain", domain);
        transcript
    }

    /// Absorb a labelled, length-prefixed message.
    pub fn absorb(&mut self, label: &[u8], data: &[u8]) {
        let mut hasher = Sha256::new();
        hasher.update(self.state);
        hasher.update((label.len() as u32).to_le_bytes());
        hasher.update(label);
        hasher.update((data.len() as u64).to_le_bytes());
        hasher.update(data);
        self.state = hasher.finalize().into();
        self.squeezed = 0;
    }

    pub fn absorb_u64(&mut self, label: &[u8], value: u64) {
        self.absorb(label, &value.to_le_bytes());
    }

    pub fn absorb_fp(&mut self, label: &[u8], value: &Fp) {
        self.absorb(label, &fp_to_bytes(value));
    }

    fn squeeze(&mut self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.state);
        hasher.update(b"squeeze");
        hasher.update(self.squeezed.to_le_bytes());
        self.squeezed += 1;
        hasher.finalize().into()
    }

    /// A field element derived from 512 uniform bits, so the reduction bias
    /// is negligible.
    pub fn challenge_fp(&mut self) -> Fp {
        let mut wide = [0u8; 64];
        wide[..32].copy_from_slice(&self.squeeze());
        wide[32..].copy_from_slice(&self.squeeze());
        Fp::from_uniform_bytes(&wide)
    }

    /// A row index in `0..rows`. `rows` must be non-zero.
    pub fn challenge_index(&mut self, rows: u64) -> u64 {
        let bytes = self.squeeze();
        let mut word = [0u8; 8];
        word.copy_from_slice(&bytes[..8]);
        u64::from_le_bytes(word) % rows.max(1)
    }
}
