//! Signed log attestations
//!
//! An attestation is the JSON encoding of a `SignedAttestation`: the log's
//! origin, coordinate, topics and data, signed with ed25519 over the
//! Keccak-256 digest of those fields.
//!
//! The signature covers the parsed fields, not the bytes, so the verifier
//! only accepts the exact encoding `to_bytes()` produces. The proof
//! fingerprint is taken over the bytes and must be unique per attested log.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use xrelay_core::{
    keccak256, keccak_all, Address, AttestationVerifier, ChainId, LogEntry, VerifiedLog,
    VerifyError, Word,
};

use crate::{ProofServiceError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedAttestation {
    pub origin_chain_id: ChainId,
    pub origin_contract: Address,
    pub block_number: u64,
    pub log_index: u32,
    pub topics: Vec<Word>,
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
    /// Hex-encoded verifying key of the signer
    pub signer: String,
    /// Hex-encoded ed25519 signature over `digest()`
    pub signature: String,
}

impl SignedAttestation {
    /// Digest of the attested fields
    pub fn digest(&self) -> [u8; 32] {
        let mut items: Vec<&[u8]> = Vec::with_capacity(self.topics.len() + 5);
        let chain = Word::from_u64(self.origin_chain_id);
        let contract = Word::from(self.origin_contract);
        let block = Word::from_u64(self.block_number);
        let index = Word::from_u64(u64::from(self.log_index));
        let data = keccak256(&self.data);
        items.push(&chain.0);
        items.push(&contract.0);
        items.push(&block.0);
        items.push(&index.0);
        for topic in &self.topics {
            items.push(&topic.0);
        }
        items.push(&data);
        keccak_all(&items)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        // Serializing plain fields cannot fail
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn from_bytes(bytes: &[u8]) -> std::result::Result<Self, VerifyError> {
        serde_json::from_slice(bytes).map_err(|e| VerifyError::Unparsable {
            message: e.to_string(),
        })
    }
}

/// Signs attestations for logs read from a source endpoint
#[derive(Clone)]
pub struct AttestationSigner {
    signing_key: SigningKey,
}

impl AttestationSigner {
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(bytes),
        }
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.verifying_key().as_bytes())
    }

    /// Attest one log entry
    pub fn attest(&self, log: &LogEntry) -> SignedAttestation {
        let mut attestation = SignedAttestation {
            origin_chain_id: log.emitter.chain_id,
            origin_contract: log.emitter.contract,
            block_number: log.block_number,
            log_index: log.log_index,
            topics: log.topics.clone(),
            data: log.data.clone(),
            signer: self.public_key_hex(),
            signature: String::new(),
        };
        let signature = self.signing_key.sign(&attestation.digest());
        attestation.signature = hex::encode(signature.to_bytes());
        attestation
    }
}

impl std::fmt::Debug for AttestationSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttestationSigner")
            .field("public_key", &self.public_key_hex())
            .finish()
    }
}

/// Accepts attestations signed by a single trusted key
#[derive(Debug, Clone)]
pub struct SignedAttestationVerifier {
    trusted: VerifyingKey,
}

impl SignedAttestationVerifier {
    pub fn new(trusted: VerifyingKey) -> Self {
        Self { trusted }
    }

    /// Parse a hex-encoded verifying key
    pub fn from_hex(key: &str) -> Result<Self> {
        let bytes = hex::decode(key.trim_start_matches("0x"))
            .map_err(|e| ProofServiceError::InvalidKey(e.to_string()))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ProofServiceError::InvalidKey("key must be 32 bytes".to_string()))?;
        let trusted = VerifyingKey::from_bytes(&bytes)
            .map_err(|e| ProofServiceError::InvalidKey(e.to_string()))?;
        Ok(Self { trusted })
    }
}

impl AttestationVerifier for SignedAttestationVerifier {
    fn verify(
        &self,
        position_in_block: u32,
        attestation: &[u8],
    ) -> std::result::Result<VerifiedLog, VerifyError> {
        let bytes = attestation;
        let attestation = SignedAttestation::from_bytes(bytes)?;
        if attestation.to_bytes() != bytes {
            return Err(VerifyError::NonCanonical);
        }

        let trusted_hex = hex::encode(self.trusted.as_bytes());
        if !attestation.signer.eq_ignore_ascii_case(&trusted_hex) {
            return Err(VerifyError::UntrustedSigner {
                signer: attestation.signer,
            });
        }
        if attestation.signer != trusted_hex {
            return Err(VerifyError::NonCanonical);
        }

        let signature_bytes = hex::decode(&attestation.signature).map_err(|e| {
            VerifyError::Unparsable {
                message: e.to_string(),
            }
        })?;
        if hex::encode(&signature_bytes) != attestation.signature {
            return Err(VerifyError::NonCanonical);
        }
        let signature =
            Signature::from_slice(&signature_bytes).map_err(|_| VerifyError::BadSignature)?;
        self.trusted
            .verify_strict(&attestation.digest(), &signature)
            .map_err(|_| VerifyError::BadSignature)?;

        if attestation.log_index != position_in_block {
            return Err(VerifyError::PositionMismatch {
                expected: position_in_block,
                actual: attestation.log_index,
            });
        }

        Ok(VerifiedLog {
            origin_chain_id: attestation.origin_chain_id,
            origin_contract: attestation.origin_contract,
            topics: attestation.topics,
            data: attestation.data,
        })
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)
    }
}
