//! Field elements used by the gate engine.
//!
//! Circuits are arithmetized over the base field of the Pallas curve, so the
//! unified addition gate can check Pallas point additions natively.

use pasta_curves::group::ff::PrimeField;

pub use pasta_curves::Fp;

/// Canonical little-endian encoding of a field element.
pub fn fp_to_bytes(value: &Fp) -> [u8; 32] {
    value.to_repr()
}

/// Decode a canonical field element. Non-canonical encodings (values ≥ p)
/// are rejected rather than reduced.
pub fn fp_from_bytes(bytes: &[u8; 32]) -> Option<Fp> {
    Fp::from_repr(*bytes).into()
}

/// Split a 32-byte word into two field elements `[high, low]`, each holding
/// 128 big-endian bits. Used to carry hashes and roots as public inputs
/// without reduction.
pub fn split_word(word: &[u8; 32]) -> [Fp; 2] {
    let mut high = [0u8; 16];
    let mut low = [0u8; 16];
    high.copy_from_slice(&word[..16]);
    low.copy_from_slice(&word[16..]);
    [
        Fp::from_u128(u128::from_be_bytes(high)),
        Fp::from_u128(u128::from_be_bytes(low)),
    ]
}
