//! Domain primitives: Mint and report formatting helpers.

use serde::{Deserialize, Serialize};

/// SPL token mint address (base58 string).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Mint(pub String);

impl Mint {
    pub fn new(mint: impl Into<String>) -> Self {
        Mint(mint.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened form for report lines, e.g. `EPjF...Dt1v`.
    pub fn short(&self) -> String {
        short_hash(&self.0)
    }
}

impl std::fmt::Display for Mint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Mint {
    fn from(s: &str) -> Self {
        Mint(s.to_string())
    }
}

/// Abbreviate a hash-like string to its first and last four characters.
pub fn short_hash(hash: &str) -> String {
    const KEEP: usize = 4;
    if hash.len() <= KEEP * 2 {
        return hash.to_string();
    }
    format!("{}...{}", &hash[..KEEP], &hash[hash.len() - KEEP..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_hash_abbreviates_long_values() {
        assert_eq!(
            short_hash("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"),
            "EPjF...Dt1v"
        );
    }

    #[test]
    fn short_hash_keeps_short_values() {
        assert_eq!(short_hash("abcd1234"), "abcd1234");
        assert_eq!(short_hash("ab"), "ab");
    }
}
