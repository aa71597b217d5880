//! Cross-chain message envelope and the oracle request it carries.

use alloy_primitives::{keccak256, Bytes, B256};
use alloy_rlp::{Decodable, RlpDecodable, RlpEncodable};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::primitives::{ChainId, ProofSystemId};
use crate::error::ErrorKind;

/// Envelope version written by this implementation.
pub const MESSAGE_VERSION: u8 = 1;

/// `version | nonce | sourceChainId | sender | destinationChainId | target`
const HEADER_LEN: usize = 1 + 8 + 4 + 32 + 4 + 32;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    #[error("Message too short: {len} bytes, header needs {HEADER_LEN}")]
    TooShort { len: usize },

    #[error("Unsupported message version {0}")]
    UnsupportedVersion(u8),

    #[error("Invalid oracle request encoding: {0}")]
    InvalidRequest(String),

    #[error("{remaining} trailing bytes after oracle request")]
    TrailingBytes { remaining: usize },
}

impl MessageError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Malformed
    }
}

/// A message as relayed between chains. Addresses are always the
/// normalized 32-byte form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub version: u8,
    pub nonce: u64,
    pub source_chain_id: ChainId,
    pub sender: B256,
    pub destination_chain_id: ChainId,
    pub target: B256,
    pub payload: Bytes,
}

impl Message {
    /// Packed big-endian encoding; the payload runs to the end.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        out.push(self.version);
        out.extend_from_slice(&self.nonce.to_be_bytes());
        out.extend_from_slice(&self.source_chain_id.to_be_bytes());
        out.extend_from_slice(self.sender.as_slice());
        out.extend_from_slice(&self.destination_chain_id.to_be_bytes());
        out.extend_from_slice(self.target.as_slice());
        out.extend_from_slice(&self.payload);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, MessageError> {
        if bytes.len() < HEADER_LEN {
            return Err(MessageError::TooShort { len: bytes.len() });
        }
        let version = bytes[0];
        if version != MESSAGE_VERSION {
            return Err(MessageError::UnsupportedVersion(version));
        }

        let mut nonce = [0u8; 8];
        nonce.copy_from_slice(&bytes[1..9]);
        let mut source = [0u8; 4];
        source.copy_from_slice(&bytes[9..13]);
        let sender = B256::from_slice(&bytes[13..45]);
        let mut destination = [0u8; 4];
        destination.copy_from_slice(&bytes[45..49]);
        let target = B256::from_slice(&bytes[49..81]);

        Ok(Self {
            version,
            nonce: u64::from_be_bytes(nonce),
            source_chain_id: u32::from_be_bytes(source),
            sender,
            destination_chain_id: u32::from_be_bytes(destination),
            target,
            payload: Bytes::copy_from_slice(&bytes[HEADER_LEN..]),
        })
    }

    /// Canonical hash: keccak256 of the packed encoding. Replay guards and
    /// storage commitments are keyed by it.
    pub fn hash(&self) -> B256 {
        keccak256(self.encode())
    }
}

/// A cross-chain request committed by the oracle and carried as a message
/// payload.
#[derive(Clone, Debug, PartialEq, Eq, RlpEncodable, RlpDecodable, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleRequest {
    pub nonce: u64,
    pub source_chain_id: ChainId,
    pub destination_chain_id: ChainId,
    pub target_contract: B256,
    pub target_data: Bytes,
    /// Opaque update blob for the verifier handler of `proof_system_id`.
    pub proof: Bytes,
    pub proof_system_id: u32,
}

impl OracleRequest {
    pub fn proof_system(&self) -> ProofSystemId {
        ProofSystemId(self.proof_system_id)
    }

    pub fn encode(&self) -> Vec<u8> {
        alloy_rlp::encode(self)
    }

    /// Decode exactly one request; trailing bytes are an error.
    pub fn decode(bytes: &[u8]) -> Result<Self, MessageError> {
        let mut buf = bytes;
        let request = <Self as Decodable>::decode(&mut buf)
            .map_err(|e| MessageError::InvalidRequest(e.to_string()))?;
        if !buf.is_empty() {
            return Err(MessageError::TrailingBytes {
                remaining: buf.len(),
            });
        }
        Ok(request)
    }
}
