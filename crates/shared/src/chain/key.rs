use std::fmt;
use std::str::FromStr;

use alloy::primitives::B256;
use alloy::signers::{local::PrivateKeySigner, SignerSync};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

use super::ChainError;

const WIF_VERSION: u8 = 0x80;
const K1_SUFFIX: &[u8] = b"K1";
const LEGACY_PUBLIC_PREFIX: &str = "EOS";
const PRIVATE_K1_PREFIX: &str = "PVT_K1_";
const SIGNATURE_K1_PREFIX: &str = "SIG_K1_";
// compact signature header: 27 + compressed-key flag (4) + recovery id
const COMPACT_HEADER_BASE: u8 = 27 + 4;

fn ripemd_checksum(data: &[u8], suffix: &[u8]) -> [u8; 4] {
    let mut hasher = Ripemd160::new();
    hasher.update(data);
    hasher.update(suffix);
    let digest = hasher.finalize();
    [digest[0], digest[1], digest[2], digest[3]]
}

fn double_sha_checksum(data: &[u8]) -> [u8; 4] {
    let digest = Sha256::digest(Sha256::digest(data));
    [digest[0], digest[1], digest[2], digest[3]]
}

/// secp256k1 signing key for chain transactions.
///
/// Accepts both the legacy WIF encoding (`5...`) and the `PVT_K1_` form.
#[derive(Clone)]
pub struct PrivateKey {
    signer: PrivateKeySigner,
}

impl PrivateKey {
    fn from_secret(secret: &[u8]) -> Result<Self, ChainError> {
        let signer = PrivateKeySigner::from_slice(secret)
            .map_err(|e| ChainError::InvalidKey(format!("not a valid secp256k1 scalar: {e}")))?;
        Ok(Self { signer })
    }

    /// Legacy `EOS...` encoding of the compressed public key.
    pub fn public_key(&self) -> String {
        let point = self.signer.credential().verifying_key().to_encoded_point(true);
        let compressed = point.as_bytes();
        let checksum = ripemd_checksum(compressed, &[]);
        let mut payload = Vec::with_capacity(compressed.len() + checksum.len());
        payload.extend_from_slice(compressed);
        payload.extend_from_slice(&checksum);
        format!(
            "{LEGACY_PUBLIC_PREFIX}{}",
            bs58::encode(payload).into_string()
        )
    }

    pub fn sign_digest(&self, digest: &B256) -> Result<Signature, ChainError> {
        let signature = self
            .signer
            .sign_hash_sync(digest)
            .map_err(|e| ChainError::Signing(e.to_string()))?;

        let mut compact = [0u8; 65];
        compact[0] = COMPACT_HEADER_BASE + u8::from(signature.v());
        compact[1..33].copy_from_slice(&signature.r().to_be_bytes::<32>());
        compact[33..].copy_from_slice(&signature.s().to_be_bytes::<32>());
        Ok(Signature(compact))
    }
}

impl FromStr for PrivateKey {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(encoded) = s.strip_prefix(PRIVATE_K1_PREFIX) {
            let raw = bs58::decode(encoded)
                .into_vec()
                .map_err(|e| ChainError::InvalidKey(format!("invalid base58: {e}")))?;
            if raw.len() != 36 {
                return Err(ChainError::InvalidKey(format!(
                    "expected 36 bytes, got {}",
                    raw.len()
                )));
            }
            let (secret, checksum) = raw.split_at(32);
            if ripemd_checksum(secret, K1_SUFFIX) != checksum {
                return Err(ChainError::InvalidKey("checksum mismatch".to_string()));
            }
            return Self::from_secret(secret);
        }

        let raw = bs58::decode(s)
            .into_vec()
            .map_err(|e| ChainError::InvalidKey(format!("invalid base58: {e}")))?;
        if raw.len() != 37 || raw[0] != WIF_VERSION {
            return Err(ChainError::InvalidKey(
                "not a WIF encoded private key".to_string(),
            ));
        }
        let (versioned, checksum) = raw.split_at(33);
        if double_sha_checksum(versioned) != checksum {
            return Err(ChainError::InvalidKey("checksum mismatch".to_string()));
        }
        Self::from_secret(&versioned[1..])
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("public_key", &self.public_key())
            .finish()
    }
}

/// Compact recoverable signature: header byte, r, s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; 65]);

impl Signature {
    pub fn as_bytes(&self) -> &[u8; 65] {
        &self.0
    }

    /// Nodes reject signatures whose r or s would need a sign-padding byte
    /// in DER form.
    pub fn is_canonical(&self) -> bool {
        let c = &self.0;
        c[1] & 0x80 == 0
            && !(c[1] == 0 && c[2] & 0x80 == 0)
            && c[33] & 0x80 == 0
            && !(c[33] == 0 && c[34] & 0x80 == 0)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let checksum = ripemd_checksum(&self.0, K1_SUFFIX);
        let mut payload = Vec::with_capacity(self.0.len() + checksum.len());
        payload.extend_from_slice(&self.0);
        payload.extend_from_slice(&checksum);
        write!(
            f,
            "{SIGNATURE_K1_PREFIX}{}",
            bs58::encode(payload).into_string()
        )
    }
}
