//! Encrypted root key material and address derivation.
//!
//! The kernel treats cryptography as opaque: an [`EncryptedRootKey`] can
//! derive addresses for its accounts and recognize addresses it owns, and
//! nothing else about it is observable. Key bytes are zeroized on drop and
//! never enter the wallet store.

use crate::address::{Address, AddressPayload};
use crate::error::DerivationError;
use crate::types::RootId;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Encrypted secret key material for one wallet root.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptedRootKey {
    material: Vec<u8>,
    #[zeroize(skip)]
    root_id: RootId,
}

impl EncryptedRootKey {
    /// Construct key material from an encrypted seed.
    pub fn from_seed(seed: &[u8]) -> Self {
        let root_id = RootId::from_pub_key_hash(&Self::pub_key_hash_of(seed));
        Self {
            material: seed.to_vec(),
            root_id,
        }
    }

    /// Hash of the root public key for a seed, as handed to wallet creation.
    pub fn pub_key_hash_of(seed: &[u8]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(b"galleon-root-pub");
        hasher.update(seed);
        hasher.finalize().into()
    }

    /// Hash of this key's root public key.
    pub fn pub_key_hash(&self) -> [u8; 32] {
        Self::pub_key_hash_of(&self.material)
    }

    /// The root this key controls.
    pub fn root_id(&self) -> RootId {
        self.root_id
    }

    /// Derive the address at `(account, index)` under this root.
    pub fn derive_address(&self, account: u32, index: u32) -> Address {
        Address::encode(self.root_id.fingerprint(), account, index)
    }

    /// Determine whether `address` belongs to this root.
    ///
    /// Returns the owning account index for addresses under this root,
    /// `None` for well-formed addresses of other roots, and
    /// [`DerivationError`] only when the payload itself is malformed.
    pub fn recognize(&self, address: &Address) -> Result<Option<u32>, DerivationError> {
        let AddressPayload {
            fingerprint,
            account,
            ..
        } = address.decode()?;
        if fingerprint == self.root_id.fingerprint() {
            Ok(Some(account))
        } else {
            Ok(None)
        }
    }
}

impl std::fmt::Debug for EncryptedRootKey {
    // Never print key bytes.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EncryptedRootKey({:?})", self.root_id)
    }
}
