//! Proof bundle wire format.
//!
//! A bundle is what a `step`/`rotate` update carries: the hex-encoded proof
//! bytes plus the `init_params` and `columns_rotations` the verifier needs to
//! interpret them. The proof bytes decode into [`ProofData`]:
//!
//! ```text
//! u32 n  | n × commitment (32 bytes)                 one per column
//! u32 m  | m × opening                               public input rows 0..m
//! u32 q  | q × ( u32 c | c × ( u32 r | r × opening ) )
//! opening = value (32 bytes, canonical Fp LE) | u8 depth | depth × 32-byte sibling
//! ```
//!
//! All integers are little-endian. Decoding is strict: truncation,
//! non-canonical field elements and trailing bytes are all rejected.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::field::{fp_from_bytes, fp_to_bytes, Fp};
use super::gate::ColumnsRotations;
use crate::error::ErrorKind;
use crate::types::primitives::hex_bytes;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProofCodecError {
    #[error("Proof truncated at byte {offset}: needed {needed} more bytes")]
    Truncated { offset: usize, needed: usize },

    #[error("Non-canonical field element at byte {offset}")]
    NonCanonicalField { offset: usize },

    #[error("Declared count {count} at byte {offset} exceeds the remaining proof length")]
    CountTooLarge { offset: usize, count: usize },

    #[error("{remaining} trailing bytes after proof")]
    TrailingBytes { remaining: usize },
}

impl ProofCodecError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Malformed
    }
}

/// Circuit shape the proof claims. The verifier bounds these against its
/// own [`VerifierParams`](super::verifier::VerifierParams) before trusting them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitParams {
    /// The trace has `2^rows_log2` rows.
    pub rows_log2: u32,
    /// Number of committed columns.
    pub columns: u32,
    /// Column holding the public input, one element per row from row 0.
    pub public_input_column: u32,
    pub public_input_len: u32,
    /// Number of random rows at which every gate is checked.
    pub query_count: u32,
}

impl InitParams {
    pub fn rows(&self) -> u64 {
        1u64 << self.rows_log2
    }
}

/// The untrusted input to `verify`: proof bytes plus their interpretation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofBundle {
    #[serde(with = "hex_bytes")]
    pub proof: Vec<u8>,
    pub init_params: InitParams,
    pub columns_rotations: ColumnsRotations,
}

/// A committed value and its authentication path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Opening {
    pub value: Fp,
    pub path: Vec<[u8; 32]>,
}

/// Openings at one query row: `columns[c][i]` opens column `c` at its
/// `i`-th rotation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryOpenings {
    pub columns: Vec<Vec<Opening>>,
}

impl QueryOpenings {
    pub fn values(&self) -> Vec<Vec<Fp>> {
        self.columns
            .iter()
            .map(|openings| openings.iter().map(|o| o.value).collect())
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProofData {
    pub commitments: Vec<[u8; 32]>,
    pub public_openings: Vec<Opening>,
    pub queries: Vec<QueryOpenings>,
}

const OPENING_MIN_LEN: usize = 33;
const COUNT_LEN: usize = 4;

impl ProofData {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_count(&mut out, self.commitments.len());
        for commitment in &self.commitments {
            out.extend_from_slice(commitment);
        }
        put_count(&mut out, self.public_openings.len());
        for opening in &self.public_openings {
            put_opening(&mut out, opening);
        }
        put_count(&mut out, self.queries.len());
        for query in &self.queries {
            put_count(&mut out, query.columns.len());
            for column in &query.columns {
                put_count(&mut out, column.len());
                for opening in column {
                    put_opening(&mut out, opening);
                }
            }
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProofCodecError> {
        let mut reader = Reader { bytes, offset: 0 };

        let count = reader.count(32)?;
        let mut commitments = Vec::with_capacity(count);
        for _ in 0..count {
            commitments.push(reader.word()?);
        }

        let count = reader.count(OPENING_MIN_LEN)?;
        let mut public_openings = Vec::with_capacity(count);
        for _ in 0..count {
            public_openings.push(reader.opening()?);
        }

        let count = reader.count(COUNT_LEN)?;
        let mut queries = Vec::with_capacity(count);
        for _ in 0..count {
            let column_count = reader.count(COUNT_LEN)?;
            let mut columns = Vec::with_capacity(column_count);
            for _ in 0..column_count {
                let opening_count = reader.count(OPENING_MIN_LEN)?;
                let mut openings = Vec::with_capacity(opening_count);
                for _ in 0..opening_count {
                    openings.push(reader.opening()?);
                }
                columns.push(openings);
            }
            queries.push(QueryOpenings { columns });
        }

        let remaining = bytes.len() - reader.offset;
        if remaining != 0 {
            return Err(ProofCodecError::TrailingBytes { remaining });
        }

        Ok(Self {
            commitments,
            public_openings,
            queries,
        })
    }
}

fn put_count(out: &mut Vec<u8>, count: usize) {
    out.extend_from_slice(&(count as u32).to_le_bytes());
}

fn put_opening(out: &mut Vec<u8>, opening: &Opening) {
    out.extend_from_slice(&fp_to_bytes(&opening.value));
    out.push(opening.path.len() as u8);
    for sibling in &opening.path {
        out.extend_from_slice(sibling);
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], ProofCodecError> {
        let available = self.bytes.len() - self.offset;
        if available < len {
            return Err(ProofCodecError::Truncated {
                offset: self.offset,
                needed: len - available,
            });
        }
        let slice = &self.bytes[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    /// A u32 count of items that each occupy at least `min_item_len` bytes.
    fn count(&mut self, min_item_len: usize) -> Result<usize, ProofCodecError> {
        let offset = self.offset;
        let mut word = [0u8; 4];
        word.copy_from_slice(self.take(COUNT_LEN)?);
        let count = u32::from_le_bytes(word) as usize;
        let remaining = self.bytes.len() - self.offset;
        if count.saturating_mul(min_item_len) > remaining {
            return Err(ProofCodecError::CountTooLarge { offset, count });
        }
        Ok(count)
    }

    fn word(&mut self) -> Result<[u8; 32], ProofCodecError> {
        let mut word = [0u8; 32];
        word.copy_from_slice(self.take(32)?);
        Ok(word)
    }

    fn opening(&mut self) -> Result<Opening, ProofCodecError> {
        let offset = self.offset;
        let value = fp_from_bytes(&self.word()?)
            .ok_or(ProofCodecError::NonCanonicalField { offset })?;
        let depth = self.take(1)?[0] as usize;
        let mut path = Vec::with_capacity(depth);
        for _ in 0..depth {
            path.push(self.word()?);
        }
        Ok(Opening { value, path })
    }
}
