//! TEA block cipher
//!
//! 64-bit blocks, 128-bit key, words read little-endian. `rounds` counts
//! Feistel rounds, so the standard 64 rounds run 32 cycles of the key
//! schedule.

use crate::error::CipherError;

pub const BLOCK_SIZE: usize = 8;
pub const KEY_SIZE: usize = 16;
pub const DEFAULT_ROUNDS: u32 = 64;

const DELTA: u32 = 0x9E37_79B9;

/// Key shipped with deployed collectors
pub const DEFAULT_KEY: [u8; KEY_SIZE] = [
    0x3A, 0xDA, 0x75, 0x21, 0xDB, 0xE2, 0xDB, 0xB3, 0x11, 0xB4, 0x49, 0x01, 0xA5, 0xC6, 0xEA, 0xD4,
];

#[derive(Clone)]
pub struct Tea {
    key: [u32; 4],
    rounds: u32,
}

impl std::fmt::Debug for Tea {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tea")
            .field("rounds", &self.rounds)
            .finish_non_exhaustive()
    }
}

impl Tea {
    pub fn new(key: &[u8]) -> Result<Self, CipherError> {
        Self::with_rounds(key, DEFAULT_ROUNDS)
    }

    pub fn with_rounds(key: &[u8], rounds: u32) -> Result<Self, CipherError> {
        if key.len() != KEY_SIZE {
            return Err(CipherError::KeySize(key.len()));
        }
        if rounds == 0 || rounds % 2 != 0 {
            return Err(CipherError::Rounds(rounds));
        }

        let mut words = [0u32; 4];
        for (word, chunk) in words.iter_mut().zip(key.chunks_exact(4)) {
            *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }

        Ok(Self { key: words, rounds })
    }

    /// Parse a 32 character hex key (whitespace and `:` ignored)
    pub fn from_hex_key(hex: &str, rounds: u32) -> Result<Self, CipherError> {
        let key = parse_hex_key(hex)?;
        Self::with_rounds(&key, rounds)
    }

    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    pub fn encrypt_block(&self, block: &mut [u8; BLOCK_SIZE]) {
        let [k0, k1, k2, k3] = self.key;
        let (mut v0, mut v1) = split_block(block);
        let mut sum = 0u32;

        for _ in 0..self.rounds / 2 {
            sum = sum.wrapping_add(DELTA);
            v0 = v0.wrapping_add(
                (v1 << 4).wrapping_add(k0) ^ v1.wrapping_add(sum) ^ (v1 >> 5).wrapping_add(k1),
            );
            v1 = v1.wrapping_add(
                (v0 << 4).wrapping_add(k2) ^ v0.wrapping_add(sum) ^ (v0 >> 5).wrapping_add(k3),
            );
        }

        join_block(block, v0, v1);
    }

    pub fn decrypt_block(&self, block: &mut [u8; BLOCK_SIZE]) {
        let [k0, k1, k2, k3] = self.key;
        let (mut v0, mut v1) = split_block(block);
        let mut sum = DELTA.wrapping_mul(self.rounds / 2);

        for _ in 0..self.rounds / 2 {
            v1 = v1.wrapping_sub(
                (v0 << 4).wrapping_add(k2) ^ v0.wrapping_add(sum) ^ (v0 >> 5).wrapping_add(k3),
            );
            v0 = v0.wrapping_sub(
                (v1 << 4).wrapping_add(k0) ^ v1.wrapping_add(sum) ^ (v1 >> 5).wrapping_add(k1),
            );
            sum = sum.wrapping_sub(DELTA);
        }

        join_block(block, v0, v1);
    }

    /// Encrypt every full block of `data` in place (ECB). A trailing partial
    /// block is left untouched; callers pad to [`BLOCK_SIZE`] first.
    pub fn encrypt_blocks(&self, data: &mut [u8]) {
        for chunk in data.chunks_exact_mut(BLOCK_SIZE) {
            if let Ok(block) = <&mut [u8; BLOCK_SIZE]>::try_from(chunk) {
                self.encrypt_block(block);
            }
        }
    }

    pub fn decrypt_blocks(&self, data: &mut [u8]) {
        for chunk in data.chunks_exact_mut(BLOCK_SIZE) {
            if let Ok(block) = <&mut [u8; BLOCK_SIZE]>::try_from(chunk) {
                self.decrypt_block(block);
            }
        }
    }
}

fn split_block(block: &[u8; BLOCK_SIZE]) -> (u32, u32) {
    (
        u32::from_le_bytes([block[0], block[1], block[2], block[3]]),
        u32::from_le_bytes([block[4], block[5], block[6], block[7]]),
    )
}

fn join_block(block: &mut [u8; BLOCK_SIZE], v0: u32, v1: u32) {
    block[..4].copy_from_slice(&v0.to_le_bytes());
    block[4..].copy_from_slice(&v1.to_le_bytes());
}

fn parse_hex_key(hex: &str) -> Result<Vec<u8>, CipherError> {
    let digits: Vec<u8> = hex
        .bytes()
        .filter(|b| !b.is_ascii_whitespace() && *b != b':')
        .collect();

    if digits.len() % 2 != 0 {
        return Err(CipherError::KeyHex(hex.to_string()));
    }

    digits
        .chunks_exact(2)
        .map(|pair| {
            let text = std::str::from_utf8(pair).map_err(|_| CipherError::KeyHex(hex.to_string()))?;
            u8::from_str_radix(text, 16).map_err(|_| CipherError::KeyHex(hex.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_key_size() {
        assert_eq!(Tea::new(&[0u8; 15]).unwrap_err(), CipherError::KeySize(15));
        assert_eq!(Tea::new(&[0u8; 17]).unwrap_err(), CipherError::KeySize(17));
        assert!(Tea::new(&[]).is_err());
    }

    #[test]
    fn test_rejects_bad_rounds() {
        assert_eq!(Tea::with_rounds(&DEFAULT_KEY, 63).unwrap_err(), CipherError::Rounds(63));
        assert_eq!(Tea::with_rounds(&DEFAULT_KEY, 0).unwrap_err(), CipherError::Rounds(0));
        assert!(Tea::with_rounds(&DEFAULT_KEY, 32).is_ok());
    }

    #[test]
    fn test_half_rounds_is_a_different_cipher() {
        let full = Tea::new(&DEFAULT_KEY).unwrap();
        let half = Tea::with_rounds(&DEFAULT_KEY, DEFAULT_ROUNDS / 2).unwrap();

        let mut a = *b"station!";
        let mut b = a;
        full.encrypt_block(&mut a);
        half.encrypt_block(&mut b);
        assert_ne!(a, b);
    }

    #[test]
    fn test_known_vector_zero_key() {
        // Reference TEA output for an all-zero key and block
        let tea = Tea::new(&[0u8; 16]).unwrap();
        let mut block = [0u8; 8];
        tea.encrypt_block(&mut block);

        let v0 = u32::from_le_bytes([block[0], block[1], block[2], block[3]]);
        let v1 = u32::from_le_bytes([block[4], block[5], block[6], block[7]]);
        assert_eq!((v0, v1), (0x41EA_3A0A, 0x94BA_A940));
    }

    #[test]
    fn test_block_roundtrip() {
        let mut seed = 0x2545_F491_u32;
        let mut next = || {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            seed
        };

        for _ in 0..200 {
            let mut key = [0u8; 16];
            for chunk in key.chunks_exact_mut(4) {
                chunk.copy_from_slice(&next().to_le_bytes());
            }
            let mut block = [0u8; 8];
            block[..4].copy_from_slice(&next().to_le_bytes());
            block[4..].copy_from_slice(&next().to_le_bytes());

            for rounds in [16, 32, 64] {
                let tea = Tea::with_rounds(&key, rounds).unwrap();
                let mut work = block;
                tea.encrypt_block(&mut work);
                assert_ne!(work, block);
                tea.decrypt_block(&mut work);
                assert_eq!(work, block);
            }
        }
    }

    #[test]
    fn test_encrypts_every_block() {
        let tea = Tea::new(&DEFAULT_KEY).unwrap();
        let plain = [0u8; 24];
        let mut data = plain;
        tea.encrypt_blocks(&mut data);

        for chunk in data.chunks_exact(8) {
            assert_ne!(chunk, &[0u8; 8]);
        }

        tea.decrypt_blocks(&mut data);
        assert_eq!(data, plain);
    }

    #[test]
    fn test_from_hex_key() {
        let tea = Tea::from_hex_key("3ADA7521 DBE2DBB3 11B44901 A5C6EAD4", DEFAULT_ROUNDS).unwrap();
        let reference = Tea::new(&DEFAULT_KEY).unwrap();

        let mut a = *b"wifiprob";
        let mut b = a;
        tea.encrypt_block(&mut a);
        reference.encrypt_block(&mut b);
        assert_eq!(a, b);

        assert!(matches!(Tea::from_hex_key("zz", 64), Err(CipherError::KeyHex(_))));
        assert!(matches!(Tea::from_hex_key("abc", 64), Err(CipherError::KeyHex(_))));
        assert_eq!(Tea::from_hex_key("00ff", 64).unwrap_err(), CipherError::KeySize(2));
    }
}
