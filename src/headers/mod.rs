//! Normalized HTTP header multimap.
mod error;
mod map;
mod iter;

pub use error::NoCombineError;
pub use map::Headers;
pub use iter::Iter;

/// Header fields whose values never combine into one comma separated string.
pub const NO_COMBINE: &[&str] = &["set-cookie"];

/// Decode bytes as Latin-1, every byte maps to the code point of the same value.
pub fn latin1_decode(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Encode a string as Latin-1, code points above `U+00FF` become `?`.
pub fn latin1_encode(value: &str) -> Vec<u8> {
    value
        .chars()
        .map(|c| u8::try_from(c as u32).unwrap_or(b'?'))
        .collect()
}

#[cfg(test)]
mod test;
