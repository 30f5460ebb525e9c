//! Crypto facade.
//!
//! Wraps three primitives behind the narrow interface the decode and
//! subscribe pipelines actually call: asymmetric signature verification, an
//! authenticated stream cipher with no associated data, and the two
//! keyed-hash derivations that walk the key tree. The original firmware
//! expresses all three through Monocypher (`crypto_eddsa_check`,
//! `crypto_aead_unlock`, `crypto_blake2b`/`crypto_blake2b_keyed`); this tree
//! realises them with `ed25519-dalek`, `chacha20poly1305` and `blake2`
//! instead; see `DESIGN.md` for why the byte layout below does not match
//! Monocypher's `crypto_aead_unlock` argument order bit for bit.

use blake2::digest::{FixedOutput, KeyInit, Mac, Update};
use blake2::Blake2bMac512;
use chacha20poly1305::aead::generic_array::GenericArray;
use chacha20poly1305::{AeadInPlace, KeyInit as AeadKeyInit, XChaCha20Poly1305};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};

use crate::CryptoError;

pub const SIGNATURE_LEN: usize = 64;
pub const PUBLIC_KEY_LEN: usize = 32;
pub const SYMMETRIC_KEY_LEN: usize = 32;
pub const TREE_KEY_LEN: usize = 16;
pub const TREE_SIDE_CONST_LEN: usize = 32;

const NONCE_LEN: usize = 24;
const TAG_LEN: usize = 16;

/// Bytes of framing (nonce + tag) that precede the ciphertext body in every
/// `enc_*` field of the wire structures.
pub const AEAD_METADATA_LEN: usize = NONCE_LEN + TAG_LEN;

/// Verifies an Ed25519 signature over `message`.
pub fn verify_sig(
    signature: &[u8; SIGNATURE_LEN],
    message: &[u8],
    public_key: &[u8; PUBLIC_KEY_LEN],
) -> Result<(), CryptoError> {
    let key = VerifyingKey::from_bytes(public_key).map_err(|_| CryptoError::BadSignature)?;
    let sig = Signature::from_bytes(signature);
    key.verify(message, &sig).map_err(|_| CryptoError::BadSignature)
}

/// Decrypts `ciphertext` in place with no associated data, returning the
/// plaintext body. `ciphertext` must be laid out as
/// `nonce (24 B) || tag (16 B) || body`; on success the body slice is
/// overwritten with the plaintext and returned, on failure it is left
/// untouched and no plaintext is ever disclosed.
pub fn decrypt_aead<'a>(
    ciphertext: &'a mut [u8],
    key: &[u8; SYMMETRIC_KEY_LEN],
) -> Result<&'a [u8], CryptoError> {
    if ciphertext.len() < AEAD_METADATA_LEN {
        return Err(CryptoError::Truncated);
    }

    let (metadata, body) = ciphertext.split_at_mut(AEAD_METADATA_LEN);
    let (nonce, tag) = metadata.split_at(NONCE_LEN);

    let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(key));
    cipher
        .decrypt_in_place_detached(
            GenericArray::from_slice(nonce),
            &[],
            body,
            GenericArray::from_slice(tag),
        )
        .map_err(|_| CryptoError::BadAead)?;

    Ok(body)
}

/// Derives a tree child key from its parent and a 32-byte left/right side
/// constant: an unkeyed BLAKE2b hash of the 48-byte concatenation,
/// truncated to 16 bytes.
pub fn kdf_child(
    parent: &[u8; TREE_KEY_LEN],
    side_const: &[u8; TREE_SIDE_CONST_LEN],
) -> [u8; TREE_KEY_LEN] {
    let mut message = [0u8; TREE_KEY_LEN + TREE_SIDE_CONST_LEN];
    message[..TREE_KEY_LEN].copy_from_slice(parent);
    message[TREE_KEY_LEN..].copy_from_slice(side_const);

    let mut hasher = blake2::Blake2bVar::new(TREE_KEY_LEN).expect("16 is a valid blake2b output length");
    blake2::digest::Update::update(&mut hasher, &message);
    let mut out = [0u8; TREE_KEY_LEN];
    blake2::digest::VariableOutput::finalize_variable(hasher, &mut out)
        .expect("output buffer matches requested length");
    out
}

/// Derives the 32-byte symmetric key used to open a frame's innermost
/// ciphertext from a 16-byte leaf tree key: an unkeyed BLAKE2b hash of the
/// leaf key, widened to 32 bytes.
pub fn kdf_leaf(tree_key: &[u8; TREE_KEY_LEN]) -> [u8; SYMMETRIC_KEY_LEN] {
    let mut hasher =
        blake2::Blake2bVar::new(SYMMETRIC_KEY_LEN).expect("32 is a valid blake2b output length");
    blake2::digest::Update::update(&mut hasher, tree_key);
    let mut out = [0u8; SYMMETRIC_KEY_LEN];
    blake2::digest::VariableOutput::finalize_variable(hasher, &mut out)
        .expect("output buffer matches requested length");
    out
}

/// Expands an 8-byte TRNG draw into 64 bytes under a keyed BLAKE2b, used by
/// the entropy pool to fold fresh randomness in without ever feeding raw
/// TRNG output straight into a delay counter.
pub fn keyed_hash_64(key: &[u8], message: &[u8]) -> [u8; 64] {
    let mut mac = Blake2bMac512::new_from_slice(key).expect("key no longer than the block size");
    Mac::update(&mut mac, message);
    let result = mac.finalize_fixed();
    let mut out = [0u8; 64];
    out.copy_from_slice(&result);
    out
}
