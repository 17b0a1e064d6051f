//! ADB public-key blob encoding.
//!
//! The daemon stores trusted keys as a base64 line of a fixed binary layout:
//! limb count, Montgomery `n0inv`, the modulus and `RR = (2^2048)^2 mod n`
//! as little-endian u32 limbs, then the exponent. The encoding here is
//! byte-compatible with the upstream tool, so keys this client registers
//! remain valid for stock adb and vice versa.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPublicKey};

use crate::error::AdbError;

/// 2048-bit modulus as u32 limbs.
const MODULUS_WORDS: usize = 64;
const MODULUS_BYTES: usize = MODULUS_WORDS * 4;

/// Encode the binary public-key structure (524 bytes for a 2048-bit key).
pub fn encode_blob(key: &RsaPublicKey) -> Result<Vec<u8>, AdbError> {
    let n = key.n();
    let mut n_bytes = n.to_bytes_le();
    if n_bytes.len() > MODULUS_BYTES {
        return Err(AdbError::KeyStore(format!(
            "modulus is {} bytes, expected at most {}",
            n_bytes.len(),
            MODULUS_BYTES
        )));
    }
    n_bytes.resize(MODULUS_BYTES, 0);

    let n0 = u32::from_le_bytes(n_bytes[0..4].try_into().unwrap());
    let n0inv = inv_mod_pow2_32(n0).wrapping_neg();

    let rr = (BigUint::from(1u8) << (MODULUS_BYTES * 8 * 2)) % n;
    let mut rr_bytes = rr.to_bytes_le();
    rr_bytes.resize(MODULUS_BYTES, 0);

    let mut exponent = [0u8; 4];
    let e_bytes = key.e().to_bytes_le();
    if e_bytes.len() > 4 {
        return Err(AdbError::KeyStore("unsupported public exponent".into()));
    }
    exponent[..e_bytes.len()].copy_from_slice(&e_bytes);

    let mut blob = Vec::with_capacity(8 + MODULUS_BYTES * 2 + 4);
    blob.extend_from_slice(&(MODULUS_WORDS as u32).to_le_bytes());
    blob.extend_from_slice(&n0inv.to_le_bytes());
    blob.extend_from_slice(&n_bytes);
    blob.extend_from_slice(&rr_bytes);
    blob.extend_from_slice(&exponent);
    Ok(blob)
}

/// Encode the single-line `adbkey.pub` form: base64 blob, space, comment.
pub fn encode_line(key: &RsaPublicKey, comment: &str) -> Result<String, AdbError> {
    let blob = encode_blob(key)?;
    Ok(format!("{} {}", STANDARD.encode(blob), comment))
}

/// Inverse of an odd `x` modulo 2^32 by Newton iteration; five steps double
/// the valid bit count past 32.
fn inv_mod_pow2_32(x: u32) -> u32 {
    let mut inv: u32 = x;
    for _ in 0..5 {
        inv = inv.wrapping_mul(2u32.wrapping_sub(x.wrapping_mul(inv)));
    }
    inv
}
