//! 16-round TEA in the chained, padded mode used by the directory protocol.
//!
//! Plaintext is prefixed with 3..=10 pad bytes (the low three bits of the
//! first byte record how many beyond three) and suffixed with seven zero
//! bytes, so the total is a multiple of eight. Each 8-byte block is XORed with
//! the previous ciphertext block before enciphering, and the result is XORed
//! with the previous pre-cipher block.

use rand::RngCore;
use thiserror::Error;

/// Key length in bytes
pub const KEY_SIZE: usize = 16;

const DELTA: u32 = 0x9E37_79B9;
const ROUNDS: u32 = 16;
const TRAILER: usize = 7;

/// Cipher errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TeaError {
    /// Key is not 16 bytes
    #[error("key must be 16 bytes, got {0}")]
    Key(usize),

    /// Ciphertext length is not a multiple of 8 or is too short
    #[error("invalid ciphertext length {0}")]
    Length(usize),

    /// Padding did not check out, usually a wrong key
    #[error("bad padding")]
    Padding,
}

/// Expanded TEA key
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct TeaKey([u32; 4]);

impl std::fmt::Debug for TeaKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TeaKey(..)")
    }
}

impl TeaKey {
    /// Create a key from 16 raw bytes
    pub const fn new(key: [u8; KEY_SIZE]) -> Self {
        let mut words = [0u32; 4];
        let mut i = 0;
        while i < 4 {
            words[i] = u32::from_be_bytes([key[4 * i], key[4 * i + 1], key[4 * i + 2], key[4 * i + 3]]);
            i += 1;
        }
        Self(words)
    }

    /// Create a key from a slice, which must be 16 bytes long
    pub fn from_slice(key: &[u8]) -> Result<Self, TeaError> {
        let raw: [u8; KEY_SIZE] = key.try_into().map_err(|_| TeaError::Key(key.len()))?;
        Ok(Self::new(raw))
    }

    /// Encrypt with random pad bytes
    pub fn encrypt(&self, plain: &[u8]) -> Vec<u8> {
        self.encrypt_with_rng(plain, &mut rand::thread_rng())
    }

    /// Encrypt drawing pad bytes from `rng`
    pub fn encrypt_with_rng<R: RngCore + ?Sized>(&self, plain: &[u8], rng: &mut R) -> Vec<u8> {
        let fill = 10 - (plain.len() + 1) % 8;
        let mut buf = vec![0u8; fill + plain.len() + TRAILER];
        rng.fill_bytes(&mut buf[1..fill]);
        buf[0] = 0xF8 | (fill - 3) as u8;
        buf[fill..fill + plain.len()].copy_from_slice(plain);

        let (mut prev_cipher, mut prev_mixed) = (0u64, 0u64);
        for block in buf.chunks_exact_mut(8) {
            let mixed = read_block(block) ^ prev_cipher;
            let cipher = self.encipher(mixed) ^ prev_mixed;
            block.copy_from_slice(&cipher.to_be_bytes());
            prev_cipher = cipher;
            prev_mixed = mixed;
        }
        buf
    }

    /// Decrypt and strip the padding
    pub fn decrypt(&self, cipher: &[u8]) -> Result<Vec<u8>, TeaError> {
        if cipher.len() < 16 || cipher.len() % 8 != 0 {
            return Err(TeaError::Length(cipher.len()));
        }

        let mut out = vec![0u8; cipher.len()];
        let (mut prev_cipher, mut prev_mixed) = (0u64, 0u64);
        for (src, dst) in cipher.chunks_exact(8).zip(out.chunks_exact_mut(8)) {
            let block = read_block(src);
            let mixed = self.decipher(block ^ prev_mixed);
            dst.copy_from_slice(&(mixed ^ prev_cipher).to_be_bytes());
            prev_cipher = block;
            prev_mixed = mixed;
        }

        let start = (out[0] & 7) as usize + 3;
        let end = out.len() - TRAILER;
        if start > end || out[end..].iter().any(|&b| b != 0) {
            return Err(TeaError::Padding);
        }
        out.truncate(end);
        out.drain(..start);
        Ok(out)
    }

    fn encipher(&self, block: u64) -> u64 {
        let [k0, k1, k2, k3] = self.0;
        let (mut v0, mut v1) = ((block >> 32) as u32, block as u32);
        let mut sum = 0u32;
        for _ in 0..ROUNDS {
            sum = sum.wrapping_add(DELTA);
            v0 = v0.wrapping_add(
                (v1 << 4).wrapping_add(k0) ^ v1.wrapping_add(sum) ^ (v1 >> 5).wrapping_add(k1),
            );
            v1 = v1.wrapping_add(
                (v0 << 4).wrapping_add(k2) ^ v0.wrapping_add(sum) ^ (v0 >> 5).wrapping_add(k3),
            );
        }
        (u64::from(v0) << 32) | u64::from(v1)
    }

    fn decipher(&self, block: u64) -> u64 {
        let [k0, k1, k2, k3] = self.0;
        let (mut v0, mut v1) = ((block >> 32) as u32, block as u32);
        let mut sum = DELTA.wrapping_mul(ROUNDS);
        for _ in 0..ROUNDS {
            v1 = v1.wrapping_sub(
                (v0 << 4).wrapping_add(k2) ^ v0.wrapping_add(sum) ^ (v0 >> 5).wrapping_add(k3),
            );
            v0 = v0.wrapping_sub(
                (v1 << 4).wrapping_add(k0) ^ v1.wrapping_add(sum) ^ (v1 >> 5).wrapping_add(k1),
            );
            sum = sum.wrapping_sub(DELTA);
        }
        (u64::from(v0) << 32) | u64::from(v1)
    }
}

fn read_block(block: &[u8]) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(block);
    u64::from_be_bytes(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    const KEY: TeaKey = TeaKey::new([
        0xF0, 0x44, 0x1F, 0x5F, 0xF4, 0x2D, 0xA5, 0x8F, 0xDC, 0xF7, 0x94, 0x9A, 0xBA, 0x62, 0xD4,
        0x11,
    ]);

    #[test]
    fn test_roundtrip_various_lengths() {
        for len in [0usize, 1, 6, 7, 8, 9, 15, 16, 17, 100, 4099] {
            let plain: Vec<u8> = (0..len).map(|i| (i * 7) as u8).collect();
            let cipher = KEY.encrypt(&plain);
            assert_eq!(cipher.len() % 8, 0);
            assert!(cipher.len() >= plain.len() + 10);
            assert_eq!(KEY.decrypt(&cipher).unwrap(), plain);
        }
    }

    #[test]
    fn test_same_pad_same_ciphertext() {
        let a = KEY.encrypt_with_rng(b"directory", &mut StepRng::new(0, 0));
        let b = KEY.encrypt_with_rng(b"directory", &mut StepRng::new(0, 0));
        assert_eq!(a, b);
        assert_ne!(&a[..], b"directory");
    }

    #[test]
    fn test_known_ciphertext() {
        // Zero pad bytes
        let cases: [(&[u8], &str); 3] = [
            (b"", "c155b8a70a499798703ce605662822e1"),
            (b"directory", "59c87c15c0c8701b837cb038d39cc6b9f3d8b7955f30a6b3"),
            (
                b"0123456789abcdef",
                "c155b8a70a49979832448ea9e89fd26b99a3c49ff4c652a4bcef6e4e99f45276",
            ),
        ];

        for (plain, expected) in cases {
            let cipher = KEY.encrypt_with_rng(plain, &mut StepRng::new(0, 0));
            assert_eq!(hex::encode(&cipher), expected);
            assert_eq!(KEY.decrypt(&hex::decode(expected).unwrap()).unwrap(), plain);
        }
    }

    #[test]
    fn test_wrong_key_fails_padding() {
        let other = TeaKey::new([1u8; KEY_SIZE]);
        let cipher = KEY.encrypt(&[0x55u8; 64]);
        assert_eq!(other.decrypt(&cipher), Err(TeaError::Padding));
    }

    #[test]
    fn test_rejects_bad_lengths() {
        assert_eq!(KEY.decrypt(&[0u8; 8]), Err(TeaError::Length(8)));
        assert_eq!(KEY.decrypt(&[0u8; 17]), Err(TeaError::Length(17)));
    }

    #[test]
    fn test_key_from_slice() {
        assert_eq!(TeaKey::from_slice(&[0u8; 15]), Err(TeaError::Key(15)));
        assert_eq!(TeaKey::from_slice(&[1u8; 16]).unwrap(), TeaKey::new([1u8; 16]));
    }
}
