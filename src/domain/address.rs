//! Algorand account addresses
//!
//! An address is the RFC 4648 base32 encoding (no padding) of a 32-byte
//! public key followed by a 4-byte checksum, the last four bytes of
//! SHA-512/256 over the key. That gives exactly 58 characters.

use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha512_256};
use std::fmt;
use std::str::FromStr;

use crate::core::ValidationError;

pub const ADDRESS_LENGTH: usize = 58;
const PUBLIC_KEY_LENGTH: usize = 32;
const CHECKSUM_LENGTH: usize = 4;
const ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// A checksum-verified account address
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Encode a public key into its address form
    pub fn from_public_key(public_key: [u8; PUBLIC_KEY_LENGTH]) -> Self {
        let mut bytes = Vec::with_capacity(PUBLIC_KEY_LENGTH + CHECKSUM_LENGTH);
        bytes.extend_from_slice(&public_key);
        bytes.extend_from_slice(&checksum(&public_key));
        Self(encode_base32(&bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn public_key(&self) -> [u8; PUBLIC_KEY_LENGTH] {
        let mut key = [0u8; PUBLIC_KEY_LENGTH];
        // Already validated on construction
        if let Some(bytes) = decode_base32(&self.0) {
            key.copy_from_slice(&bytes[..PUBLIC_KEY_LENGTH]);
        }
        key
    }

    /// Shortened form used in log lines
    pub fn short(&self) -> String {
        format!("{}...{}", &self.0[..6], &self.0[ADDRESS_LENGTH - 6..])
    }
}

impl FromStr for Address {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        let invalid = |reason: &str| ValidationError::InvalidAddress {
            value: value.to_string(),
            reason: reason.to_string(),
        };

        if value.len() != ADDRESS_LENGTH {
            return Err(invalid(&format!(
                "expected {} characters, got {}",
                ADDRESS_LENGTH,
                value.len()
            )));
        }

        let bytes = decode_base32(value).ok_or_else(|| invalid("not valid base32"))?;
        if bytes.len() != PUBLIC_KEY_LENGTH + CHECKSUM_LENGTH {
            return Err(invalid("wrong decoded length"));
        }

        let (key, sum) = bytes.split_at(PUBLIC_KEY_LENGTH);
        if checksum(key) != sum {
            return Err(invalid("checksum mismatch"));
        }

        Ok(Self(value.to_string()))
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn checksum(public_key: &[u8]) -> [u8; CHECKSUM_LENGTH] {
    let digest = Sha512_256::digest(public_key);
    let mut sum = [0u8; CHECKSUM_LENGTH];
    sum.copy_from_slice(&digest[digest.len() - CHECKSUM_LENGTH..]);
    sum
}

fn encode_base32(data: &[u8]) -> String {
    let mut out = String::with_capacity((data.len() * 8).div_ceil(5));
    let mut buffer: u32 = 0;
    let mut bits = 0u32;

    for &byte in data {
        buffer = (buffer << 8) | byte as u32;
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
        buffer &= (1 << bits) - 1;
    }
    if bits > 0 {
        out.push(ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }
    out
}

/// Unpadded decode; trailing bits must be zero
fn decode_base32(input: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len() * 5 / 8);
    let mut buffer: u32 = 0;
    let mut bits = 0u32;

    for c in input.bytes() {
        let value = match c {
            b'A'..=b'Z' => c - b'A',
            b'2'..=b'7' => c - b'2' + 26,
            _ => return None,
        };
        buffer = (buffer << 5) | value as u32;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push((buffer >> bits) as u8);
            buffer &= (1 << bits) - 1;
        }
    }

    if buffer != 0 {
        return None;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ZERO_ADDRESS: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAY5HFKQ";

    #[test]
    fn test_zero_address_encoding() {
        let address = Address::from_public_key([0u8; 32]);
        assert_eq!(address.as_str(), ZERO_ADDRESS);
        assert_eq!(address.as_str().len(), ADDRESS_LENGTH);
    }

    #[test]
    fn test_round_trip() {
        let mut key = [0u8; 32];
        for (i, byte) in key.iter_mut().enumerate() {
            *byte = (i * 7 + 3) as u8;
        }
        let address = Address::from_public_key(key);
        let parsed: Address = address.as_str().parse().unwrap();
        assert_eq!(parsed, address);
        assert_eq!(parsed.public_key(), key);
    }

    #[test]
    fn test_rejects_bad_length() {
        let err = "ABC".parse::<Address>().unwrap_err();
        assert!(matches!(err, ValidationError::InvalidAddress { .. }));
    }

    #[test]
    fn test_rejects_bad_checksum() {
        // Same length, last character altered
        let tampered = format!("{}A", &ZERO_ADDRESS[..ADDRESS_LENGTH - 1]);
        let err = tampered.parse::<Address>().unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidAddress {
                value: tampered.clone(),
                reason: "checksum mismatch".into()
            }
        );
    }

    #[test]
    fn test_rejects_non_alphabet() {
        let lowercase = ZERO_ADDRESS.to_lowercase();
        assert!(lowercase.parse::<Address>().is_err());
    }
}
