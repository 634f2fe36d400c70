//! Address Derivation
//! Mission: Turn a stored recovery phrase into the public address of each supported chain
//!
//! Pure computation, no I/O. The same phrase always yields the same address, and key
//! material is dropped as soon as the public address has been computed.

use crate::models::Chain;
use bip39::Mnemonic;
use crc::{Crc, CRC_16_XMODEM};
use ed25519_dalek::SigningKey;
use hmac::{Hmac, Mac};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{PublicKey, SecretKey};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use tiny_keccak::{Hasher, Keccak};

type HmacSha512 = Hmac<Sha512>;

/// StrKey version byte for ed25519 public keys ("G...")
const STELLAR_ACCOUNT_VERSION: u8 = 6 << 3;
const STELLAR_CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// Ripple account id version byte ("r...")
const RIPPLE_ACCOUNT_VERSION: u8 = 0;
const RIPPLE_SEED_LEN: usize = 16;

const HARDENED: u32 = 0x8000_0000;
/// m/44'/60'/0'/0/0
const EVM_PATH: [u32; 5] = [44 | HARDENED, 60 | HARDENED, HARDENED, 0, 0];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DerivationError {
    /// Not a valid BIP-39 mnemonic (unknown word, bad length or checksum)
    InvalidPhrase(String),
    /// Key arithmetic produced an unusable key; astronomically unlikely
    InvalidKey(&'static str),
}

impl fmt::Display for DerivationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DerivationError::InvalidPhrase(reason) => write!(f, "invalid recovery phrase: {reason}"),
            DerivationError::InvalidKey(stage) => write!(f, "invalid derived key at {stage}"),
        }
    }
}

impl std::error::Error for DerivationError {}

/// Parsed, checksum-validated recovery phrase
pub struct RecoverySecret {
    mnemonic: Mnemonic,
}

impl RecoverySecret {
    /// Whitespace and case are normalized before validation
    pub fn parse(phrase: &str) -> Result<Self, DerivationError> {
        let normalized = phrase
            .split_whitespace()
            .map(|w| w.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ");

        let mnemonic = Mnemonic::parse_normalized(&normalized)
            .map_err(|e| DerivationError::InvalidPhrase(e.to_string()))?;

        Ok(Self { mnemonic })
    }

    fn seed(&self) -> [u8; 64] {
        self.mnemonic.to_seed_normalized("")
    }

    fn entropy(&self) -> Vec<u8> {
        self.mnemonic.to_entropy()
    }
}

impl fmt::Debug for RecoverySecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RecoverySecret(<redacted>)")
    }
}

/// Derive the public address for one chain
pub fn derive_address(chain: Chain, secret: &RecoverySecret) -> Result<String, DerivationError> {
    match chain {
        Chain::Stellar => Ok(stellar_address(secret)),
        Chain::Ripple => ripple_address(secret),
        Chain::Ethereum => evm_address(secret),
    }
}

// ============================================================================
// Stellar
// ============================================================================

fn stellar_address(secret: &RecoverySecret) -> String {
    let seed = secret.seed();
    let mut raw = [0u8; 32];
    raw.copy_from_slice(&seed[..32]);

    stellar_strkey(&SigningKey::from_bytes(&raw).verifying_key().to_bytes())
}

/// `G...` account id: version byte, key, CRC16-XModem little-endian, base32 without padding
fn stellar_strkey(public: &[u8; 32]) -> String {
    let mut payload = Vec::with_capacity(35);
    payload.push(STELLAR_ACCOUNT_VERSION);
    payload.extend_from_slice(public);
    let checksum = STELLAR_CRC.checksum(&payload);
    payload.extend_from_slice(&checksum.to_le_bytes());

    data_encoding::BASE32_NOPAD.encode(&payload)
}

// ============================================================================
// Ripple
// ============================================================================

fn ripple_address(secret: &RecoverySecret) -> Result<String, DerivationError> {
    let entropy = secret.entropy();
    ripple_address_from_seed(&entropy[..RIPPLE_SEED_LEN.min(entropy.len())])
}

fn ripple_address_from_seed(family_seed: &[u8]) -> Result<String, DerivationError> {
    let root = ripple_scalar(family_seed, None)?;
    let root_public = compressed(&root.public_key());
    let intermediate = ripple_scalar(&root_public, Some(0))?;

    let account = add_scalars(&root, &intermediate)?;
    let account_id = hash160(&compressed(&account.public_key()));

    let mut payload = Vec::with_capacity(21);
    payload.push(RIPPLE_ACCOUNT_VERSION);
    payload.extend_from_slice(&account_id);

    Ok(bs58::encode(payload)
        .with_alphabet(bs58::Alphabet::RIPPLE)
        .with_check()
        .into_string())
}

/// First half of SHA-512(bytes ‖ [index] ‖ seq) for the first seq giving a valid key
fn ripple_scalar(bytes: &[u8], index: Option<u32>) -> Result<SecretKey, DerivationError> {
    for seq in 0u32..=u32::MAX {
        let mut hasher = Sha512::new();
        hasher.update(bytes);
        if let Some(index) = index {
            hasher.update(index.to_be_bytes());
        }
        hasher.update(seq.to_be_bytes());
        let digest = hasher.finalize();

        if let Ok(key) = SecretKey::from_slice(&digest[..32]) {
            return Ok(key);
        }
    }
    Err(DerivationError::InvalidKey("ripple scalar"))
}

fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(data);
    let digest = Ripemd160::digest(sha);
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest);
    out
}

// ============================================================================
// Ethereum
// ============================================================================

fn evm_address(secret: &RecoverySecret) -> Result<String, DerivationError> {
    let seed = secret.seed();

    let master = hmac_sha512(b"Bitcoin seed", &[&seed[..]])?;
    let mut key = SecretKey::from_slice(&master[..32])
        .map_err(|_| DerivationError::InvalidKey("bip32 master"))?;
    let mut chain_code = [0u8; 32];
    chain_code.copy_from_slice(&master[32..]);

    for index in EVM_PATH {
        let (child, child_code) = bip32_child(&key, &chain_code, index)?;
        key = child;
        chain_code = child_code;
    }

    let uncompressed = key.public_key().to_encoded_point(false);
    let hash = keccak256(&uncompressed.as_bytes()[1..]);
    Ok(to_checksum_address(&hash[12..]))
}

fn bip32_child(
    parent: &SecretKey,
    chain_code: &[u8; 32],
    index: u32,
) -> Result<(SecretKey, [u8; 32]), DerivationError> {
    let index_bytes = index.to_be_bytes();
    let digest = if index & HARDENED != 0 {
        let parent_bytes = parent.to_bytes();
        hmac_sha512(chain_code, &[&[0u8][..], parent_bytes.as_slice(), &index_bytes[..]])?
    } else {
        let public = compressed(&parent.public_key());
        hmac_sha512(chain_code, &[public.as_slice(), &index_bytes[..]])?
    };

    let tweak = SecretKey::from_slice(&digest[..32])
        .map_err(|_| DerivationError::InvalidKey("bip32 child tweak"))?;
    let child = add_scalars(parent, &tweak)?;

    let mut child_code = [0u8; 32];
    child_code.copy_from_slice(&digest[32..]);
    Ok((child, child_code))
}

fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut out = [0u8; 32];
    hasher.finalize(&mut out);
    out
}

/// EIP-55 mixed-case encoding
fn to_checksum_address(address: &[u8]) -> String {
    let lower = hex::encode(address);
    let hash = keccak256(lower.as_bytes());

    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let nibble = (hash[i / 2] >> (if i % 2 == 0 { 4 } else { 0 })) & 0x0f;
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

// ============================================================================
// secp256k1 helpers
// ============================================================================

fn compressed(public: &PublicKey) -> Vec<u8> {
    public.to_encoded_point(true).as_bytes().to_vec()
}

/// (a + b) mod n
fn add_scalars(a: &SecretKey, b: &SecretKey) -> Result<SecretKey, DerivationError> {
    let sum = *a.to_nonzero_scalar() + *b.to_nonzero_scalar();
    SecretKey::from_bytes(&sum.to_bytes()).map_err(|_| DerivationError::InvalidKey("scalar sum"))
}

fn hmac_sha512(key: &[u8], parts: &[&[u8]]) -> Result<[u8; 64], DerivationError> {
    let mut mac =
        HmacSha512::new_from_slice(key).map_err(|_| DerivationError::InvalidKey("hmac key"))?;
    for part in parts {
        mac.update(part);
    }
    let mut out = [0u8; 64];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}
