//! Address payloads and their structured encoding.
//!
//! Addresses are opaque byte strings to the ledger. Wallet-derived addresses
//! carry a fixed payload (magic, version, root fingerprint, account and
//! address index, checksum) so the prefilter can recognize ownership without
//! touching key material. Foreign addresses simply fail to decode.

use crate::error::DerivationError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Leading magic bytes of a wallet-derived address payload.
const MAGIC: [u8; 2] = [0x6b, 0x31];

/// Current payload encoding version.
const VERSION: u8 = 1;

/// magic(2) + version(1) + fingerprint(8) + account(4) + index(4)
const BODY_LEN: usize = 19;

/// Body plus the 4-byte checksum.
const PAYLOAD_LEN: usize = BODY_LEN + 4;

/// A ledger address.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(Vec<u8>);

/// The decoded structure of a wallet-derived address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressPayload {
    /// Fingerprint of the owning root.
    pub fingerprint: [u8; 8],
    /// Account index beneath that root.
    pub account: u32,
    /// Address index within the account.
    pub index: u32,
}

impl Address {
    /// Wrap raw address bytes without interpreting them.
    ///
    /// Used for counterparty addresses the wallet does not own.
    pub fn opaque(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Encode a wallet-derived address.
    pub(crate) fn encode(fingerprint: [u8; 8], account: u32, index: u32) -> Self {
        let mut bytes = Vec::with_capacity(PAYLOAD_LEN);
        bytes.extend_from_slice(&MAGIC);
        bytes.push(VERSION);
        bytes.extend_from_slice(&fingerprint);
        bytes.extend_from_slice(&account.to_be_bytes());
        bytes.extend_from_slice(&index.to_be_bytes());
        let check = checksum(&bytes);
        bytes.extend_from_slice(&check);
        Self(bytes)
    }

    /// Decode the structured payload of a wallet-derived address.
    ///
    /// Errors identify malformed payloads only; a well-formed address owned
    /// by a different root decodes fine and is rejected later by fingerprint
    /// comparison.
    pub fn decode(&self) -> Result<AddressPayload, DerivationError> {
        if self.0.len() < PAYLOAD_LEN {
            return Err(DerivationError::TooShort(self.0.len()));
        }
        if self.0[..2] != MAGIC {
            return Err(DerivationError::BadMagic);
        }
        if self.0[2] != VERSION {
            return Err(DerivationError::UnsupportedVersion(self.0[2]));
        }
        let (body, check) = self.0.split_at(BODY_LEN);
        if checksum(body) != check[..4] {
            return Err(DerivationError::ChecksumMismatch);
        }
        let mut fingerprint = [0u8; 8];
        fingerprint.copy_from_slice(&body[3..11]);
        let account = u32::from_be_bytes(body[11..15].try_into().expect("4-byte slice"));
        let index = u32::from_be_bytes(body[15..19].try_into().expect("4-byte slice"));
        Ok(AddressPayload {
            fingerprint,
            account,
            index,
        })
    }

    /// Raw payload bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

fn checksum(body: &[u8]) -> [u8; 4] {
    let mut hasher = Sha256::new();
    hasher.update(body);
    let digest = hasher.finalize();
    let mut check = [0u8; 4];
    check.copy_from_slice(&digest[..4]);
    check
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = self.0.len().min(8);
        write!(f, "Address({}…)", hex::encode(&self.0[..shown]))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        let addr = Address::encode([7u8; 8], 3, 41);
        let payload = addr.decode().expect("well-formed payload");
        assert_eq!(payload.fingerprint, [7u8; 8]);
        assert_eq!(payload.account, 3);
        assert_eq!(payload.index, 41);
    }

    #[test]
    fn foreign_bytes_fail_to_decode() {
        let short = Address::opaque(vec![1, 2, 3]);
        assert_eq!(short.decode(), Err(DerivationError::TooShort(3)));

        let wrong_magic = Address::opaque(vec![0u8; PAYLOAD_LEN]);
        assert_eq!(wrong_magic.decode(), Err(DerivationError::BadMagic));
    }

    #[test]
    fn corrupted_payload_fails_checksum() {
        let mut bytes = Address::encode([7u8; 8], 3, 41).0;
        bytes[12] ^= 0xff;
        let corrupted = Address(bytes);
        assert_eq!(corrupted.decode(), Err(DerivationError::ChecksumMismatch));
    }

    #[test]
    fn unsupported_version_is_reported() {
        let mut bytes = Address::encode([7u8; 8], 0, 0).0;
        bytes[2] = 9;
        // Re-checksum so the version is the only defect.
        let check = checksum(&bytes[..BODY_LEN]);
        bytes[BODY_LEN..].copy_from_slice(&check);
        let addr = Address(bytes);
        assert_eq!(addr.decode(), Err(DerivationError::UnsupportedVersion(9)));
    }
}
