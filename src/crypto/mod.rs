//! Symmetric/asymmetric primitives and key derivation for bulkstore.
//!
//! - TOC and blob bodies: AES-256-CBC, PKCS#7 padded. Confidentiality only —
//!   there is no authentication tag. A bit-flip in ciphertext decrypts
//!   without error, or fails unpadding; see DESIGN.md for the open question
//!   this carries forward from spec.md §9.
//! - Header TOC-info block: RSA-4096, OAEP (SHA-256 digest, SHA-256 MGF).
//! - Key derivation (fresh TOC key from a random passphrase): PBKDF2-HMAC-SHA256.
//! - Private key storage: PKCS#8 PEM, AES-256-CBC passphrase-protected
//!   (the standard PBES2 envelope). Public key storage: SPKI PEM.

use aes::Aes256;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroizing;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// RSA modulus size used for every generated keypair. Fixed at 4096 bits
/// per spec.md §6 — the 512-byte OAEP ciphertext is what sizes the
/// header's `tocInfoCipher` field.
pub const RSA_KEY_BITS: usize = 4096;

/// Default PBKDF2 iteration count for deriving a fresh TOC symmetric key
/// from a random passphrase, per spec.md §4.2.
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 16_384;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("AES-CBC decryption failed (wrong key/IV or corrupt ciphertext): {0}")]
    AesDecrypt(String),
    #[error("RSA-OAEP encryption failed: {0}")]
    RsaEncrypt(String),
    #[error("RSA-OAEP decryption failed: {0}")]
    RsaDecrypt(String),
    #[error("RSA key generation failed: {0}")]
    KeyGen(String),
    #[error("failed to parse PEM key material: {0}")]
    KeyParse(String),
}

/// PBKDF2 work-factor configuration, carried alongside a derived key so it
/// can be logged/audited at the call site that generated it.
#[derive(Debug, Clone, Copy)]
pub struct KdfParams {
    pub iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_PBKDF2_ITERATIONS,
        }
    }
}

// ── Random generation ────────────────────────────────────────────────────────

/// A fresh random 32-byte symmetric key.
pub fn random_key() -> [u8; 32] {
    let mut k = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut k);
    k
}

/// A fresh random 16-byte IV.
pub fn random_iv() -> [u8; 16] {
    let mut iv = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut iv);
    iv
}

/// A fresh random 16-byte salt for PBKDF2.
pub fn random_salt() -> [u8; 16] {
    let mut s = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut s);
    s
}

/// A fresh random passphrase of `len` bytes, used internally to derive a
/// fresh TOC key on `create` (spec.md §4.2: "random passphrase").
pub fn random_passphrase(len: usize) -> Zeroizing<Vec<u8>> {
    let mut p = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut p);
    Zeroizing::new(p)
}

// ── Key derivation ───────────────────────────────────────────────────────────

/// Derive a 32-byte key from `passphrase` and `salt` via PBKDF2-HMAC-SHA256.
pub fn derive_key_pbkdf2(passphrase: &[u8], salt: &[u8], params: KdfParams) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(passphrase, salt, params.iterations, &mut key);
    key
}

// ── AES-256-CBC (TOC and blob bodies) ────────────────────────────────────────

/// Encrypt `plaintext` with AES-256-CBC under `(key, iv)`, PKCS#7 padded.
pub fn aes256_cbc_encrypt(key: &[u8; 32], iv: &[u8; 16], plaintext: &[u8]) -> Vec<u8> {
    Aes256CbcEnc::new(key.into(), iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

/// Decrypt an AES-256-CBC, PKCS#7-padded ciphertext produced by
/// [`aes256_cbc_encrypt`]. Fails if the ciphertext is not a multiple of the
/// block size or the padding is invalid (wrong key/IV, or corruption).
pub fn aes256_cbc_decrypt(
    key: &[u8; 32],
    iv: &[u8; 16],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    Aes256CbcDec::new(key.into(), iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|e| CryptoError::AesDecrypt(e.to_string()))
}

// ── RSA-OAEP (header TOC-info block) ─────────────────────────────────────────

/// Generate a fresh RSA-4096 keypair, returning the private key PEM
/// (PKCS#8, AES-256-CBC encrypted under `passphrase`) and the public key
/// PEM (SPKI). This is the `genKey` helper from spec.md §6.
pub fn gen_key(passphrase: &str) -> Result<(Zeroizing<String>, String), CryptoError> {
    let mut rng = rand::thread_rng();
    let private_key = RsaPrivateKey::new(&mut rng, RSA_KEY_BITS)
        .map_err(|e| CryptoError::KeyGen(e.to_string()))?;
    let public_key = RsaPublicKey::from(&private_key);

    let private_pem = private_key
        .to_pkcs8_encrypted_pem(&mut rng, passphrase.as_bytes(), LineEnding::LF)
        .map_err(|e| CryptoError::KeyGen(e.to_string()))?;
    let public_pem = public_key
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| CryptoError::KeyGen(e.to_string()))?;

    Ok((private_pem, public_pem))
}

/// Parse an AES-256-CBC-encrypted PKCS#8 PEM private key.
pub fn load_private_key(pem: &str, passphrase: &str) -> Result<RsaPrivateKey, CryptoError> {
    RsaPrivateKey::from_pkcs8_encrypted_pem(pem, passphrase.as_bytes())
        .map_err(|e| CryptoError::KeyParse(e.to_string()))
}

/// Parse an SPKI PEM public key.
pub fn load_public_key(pem: &str) -> Result<RsaPublicKey, CryptoError> {
    RsaPublicKey::from_public_key_pem(pem).map_err(|e| CryptoError::KeyParse(e.to_string()))
}

/// Encrypt `plaintext` (at most 446 bytes for a 4096-bit key with a
/// SHA-256 OAEP digest) under `public_key`. Used for the header's
/// TOC-info block (256-byte plaintext fits comfortably).
pub fn rsa_encrypt(public_key: &RsaPublicKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut rng = rand::thread_rng();
    public_key
        .encrypt(&mut rng, Oaep::new::<Sha256>(), plaintext)
        .map_err(|e| CryptoError::RsaEncrypt(e.to_string()))
}

/// Decrypt an RSA-OAEP ciphertext produced by [`rsa_encrypt`].
pub fn rsa_decrypt(private_key: &RsaPrivateKey, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    private_key
        .decrypt(Oaep::new::<Sha256>(), ciphertext)
        .map_err(|e| CryptoError::RsaDecrypt(e.to_string()))
}
