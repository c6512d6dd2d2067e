//! BLAKE3 checksums for pristine texts

use crate::error::{IoResultExt, Result, WcError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::Path;

/// Files at or above this size are hashed through a memory map
const MMAP_THRESHOLD: u64 = 4 * 1024 * 1024;

/// A BLAKE3 digest (32 bytes), serialized as lowercase hex
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Checksum([u8; 32]);

impl Checksum {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        const HEX_CHARS: &[u8] = b"0123456789abcdef";
        let mut hex = String::with_capacity(64);
        for &byte in &self.0 {
            hex.push(HEX_CHARS[(byte >> 4) as usize] as char);
            hex.push(HEX_CHARS[(byte & 0xf) as usize] as char);
        }
        hex
    }

    /// Parse from hex string
    pub fn from_hex(hex: &str) -> Result<Self> {
        if hex.len() != 64 {
            return Err(WcError::Serialization(format!(
                "Invalid checksum length: expected 64 characters, got {}",
                hex.len()
            )));
        }

        let mut bytes = [0u8; 32];
        for (i, byte) in bytes.iter_mut().enumerate() {
            let high = hex_char_to_nibble(hex.as_bytes()[i * 2])?;
            let low = hex_char_to_nibble(hex.as_bytes()[i * 2 + 1])?;
            *byte = (high << 4) | low;
        }
        Ok(Self(bytes))
    }
}

fn hex_char_to_nibble(c: u8) -> Result<u8> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err(WcError::Serialization(format!(
            "Invalid hex character in checksum: {}",
            c as char
        ))),
    }
}

impl std::fmt::Debug for Checksum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Checksum({})", self.to_hex())
    }
}

impl std::fmt::Display for Checksum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for Checksum {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Checksum {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        Checksum::from_hex(&hex).map_err(serde::de::Error::custom)
    }
}

/// Hash bytes using BLAKE3
pub fn hash_bytes(data: &[u8]) -> Checksum {
    Checksum::from_bytes(*blake3::hash(data).as_bytes())
}

/// Hash a file, streaming small files and memory-mapping large ones
pub fn hash_file(path: &Path) -> Result<Checksum> {
    use std::fs::File;
    use std::io::{BufReader, Read};

    let file = File::open(path).at(path)?;
    let len = file.metadata().at(path)?.len();
    if len >= MMAP_THRESHOLD {
        // Safety: text bases are only replaced by rename, never truncated in place.
        let mmap = unsafe { memmap2::Mmap::map(&file) }.at(path)?;
        return Ok(hash_bytes(&mmap));
    }

    let mut reader = BufReader::new(file);
    let mut hasher = IncrementalHasher::new();
    let mut buffer = [0u8; 8192];
    loop {
        let bytes_read = reader.read(&mut buffer).at(path)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize())
}

/// Incremental hasher for text produced window by window
pub struct IncrementalHasher {
    inner: blake3::Hasher,
}

impl IncrementalHasher {
    pub fn new() -> Self {
        Self {
            inner: blake3::Hasher::new(),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    pub fn finalize(self) -> Checksum {
        Checksum::from_bytes(*self.inner.finalize().as_bytes())
    }
}

impl Default for IncrementalHasher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_hex_encoding_roundtrip() {
        let original = Checksum::from_bytes([42; 32]);
        let decoded = Checksum::from_hex(&original.to_hex()).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_hex_decoding_invalid() {
        assert!(Checksum::from_hex("abc").is_err());
        assert!(Checksum::from_hex(&"g".repeat(64)).is_err());
    }

    #[test]
    fn test_incremental_matches_direct() {
        let mut incremental = IncrementalHasher::new();
        incremental.update(b"hello ");
        incremental.update(b"world");
        assert_eq!(incremental.finalize(), hash_bytes(b"hello world"));
    }

    #[test]
    fn test_hash_file_small_and_large() {
        let temp_dir = tempfile::tempdir().unwrap();

        let small = temp_dir.path().join("small.txt");
        std::fs::write(&small, b"test file content").unwrap();
        assert_eq!(hash_file(&small).unwrap(), hash_bytes(b"test file content"));

        let large = temp_dir.path().join("large.bin");
        let mut file = std::fs::File::create(&large).unwrap();
        let chunk = vec![0xAB; 1024 * 1024];
        for _ in 0..5 {
            file.write_all(&chunk).unwrap();
        }
        drop(file);
        let expected = hash_bytes(&vec![0xAB; 5 * 1024 * 1024]);
        assert_eq!(hash_file(&large).unwrap(), expected);
    }

    #[test]
    fn test_serde_as_hex_string() {
        let sum = hash_bytes(b"abc");
        let json = serde_json::to_string(&sum).unwrap();
        assert_eq!(json, format!("\"{}\"", sum.to_hex()));
        let back: Checksum = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sum);
    }
}
