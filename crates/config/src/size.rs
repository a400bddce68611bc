//! Human-readable byte sizes ("50MiB", "512 KB", "1048576").

use crate::error::{ErrorKind, Result};
use serde::{Deserialize, Deserializer};

// Longest suffixes first.
const UNITS: [(&str, u64); 10] = [
    ("kib", 1 << 10),
    ("mib", 1 << 20),
    ("gib", 1 << 30),
    ("kb", 1 << 10),
    ("mb", 1 << 20),
    ("gb", 1 << 30),
    ("k", 1 << 10),
    ("m", 1 << 20),
    ("g", 1 << 30),
    ("b", 1),
];

/// Parse a size string into bytes.
///
/// Bare numbers are bytes. `K`, `M` and `G` suffixes (optionally followed by
/// `B` or `iB`, any case) are binary multiples.
pub fn parse_size(input: &str) -> Result<u64> {
    let invalid = || ErrorKind::InvalidSize(input.to_string());
    let lower = input.trim().to_lowercase();
    let (number, multiplier) = UNITS
        .iter()
        .find_map(|(suffix, multiplier)| lower.strip_suffix(suffix).map(|n| (n, *multiplier)))
        .unwrap_or((lower.as_str(), 1));
    let number: u64 = number.trim().parse().map_err(|_| invalid())?;
    number.checked_mul(multiplier).ok_or_else(|| exn::Exn::from(invalid()))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSize {
    Bytes(u64),
    Text(String),
}
impl RawSize {
    fn bytes<E: serde::de::Error>(self) -> std::result::Result<u64, E> {
        match self {
            RawSize::Bytes(bytes) => Ok(bytes),
            RawSize::Text(text) => parse_size(&text).map_err(E::custom),
        }
    }
}

pub(crate) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u64, D::Error> {
    RawSize::deserialize(deserializer)?.bytes()
}

pub(crate) fn deserialize_option<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<u64>, D::Error> {
    Option::<RawSize>::deserialize(deserializer)?.map(RawSize::bytes).transpose()
}
