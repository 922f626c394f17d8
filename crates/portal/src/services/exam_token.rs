//! Exam access tokens.
//!
//! Teachers hand out a short code; students type it to open the exam. Codes
//! use uppercase letters and digits minus the glyphs that are easy to misread
//! (`0`/`O`, `1`/`I`/`L`), and input is normalised before it is checked.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of characters in a token.
pub const TOKEN_LENGTH: usize = 6;

/// Characters a token may contain.
pub const TOKEN_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Errors from parsing a user-supplied token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExamTokenError {
    #[error("exam token must be {expected} characters (got {actual})")]
    WrongLength { expected: usize, actual: usize },

    #[error("exam token contains invalid character '{0}'")]
    InvalidCharacter(char),
}

/// A validated exam access token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExamToken(String);

impl ExamToken {
    /// Generate a fresh random token.
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let token = (0..TOKEN_LENGTH)
            .map(|_| {
                let idx = rng.random_range(0..TOKEN_ALPHABET.len());
                char::from(TOKEN_ALPHABET.get(idx).copied().unwrap_or(b'A'))
            })
            .collect();
        Self(token)
    }

    /// Parse user input: surrounding whitespace is ignored and letters are
    /// uppercased.
    ///
    /// # Errors
    ///
    /// Returns an error if the normalised input has the wrong length or a
    /// character outside [`TOKEN_ALPHABET`].
    pub fn parse(input: &str) -> Result<Self, ExamTokenError> {
        let normalised = input.trim().to_ascii_uppercase();

        let actual = normalised.chars().count();
        if actual != TOKEN_LENGTH {
            return Err(ExamTokenError::WrongLength {
                expected: TOKEN_LENGTH,
                actual,
            });
        }
        if let Some(bad) = normalised
            .chars()
            .find(|c| !u8::try_from(*c).is_ok_and(|b| TOKEN_ALPHABET.contains(&b)))
        {
            return Err(ExamTokenError::InvalidCharacter(bad));
        }

        Ok(Self(normalised))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExamToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ExamToken {
    type Err = ExamTokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ExamToken {
    type Error = ExamTokenError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ExamToken> for String {
    fn from(token: ExamToken) -> Self {
        token.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_tokens_use_alphabet() {
        for _ in 0..500 {
            let token = ExamToken::generate();
            assert_eq!(token.as_str().len(), TOKEN_LENGTH);
            assert!(token.as_str().bytes().all(|b| TOKEN_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn test_alphabet_excludes_ambiguous_glyphs() {
        for c in [b'0', b'O', b'1', b'I', b'L'] {
            assert!(!TOKEN_ALPHABET.contains(&c));
        }
    }

    #[test]
    fn test_parse_normalises_input() {
        let token = ExamToken::parse("  k7m2qx \n").unwrap();
        assert_eq!(token.as_str(), "K7M2QX");
        assert_eq!("k7m2qx".parse::<ExamToken>().unwrap(), token);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert_eq!(
            ExamToken::parse("ABC"),
            Err(ExamTokenError::WrongLength {
                expected: 6,
                actual: 3
            })
        );
        assert_eq!(
            ExamToken::parse("ABCDE0"),
            Err(ExamTokenError::InvalidCharacter('0'))
        );
        assert_eq!(
            ExamToken::parse("ABCDÉF"),
            Err(ExamTokenError::InvalidCharacter('É'))
        );
    }

    #[test]
    fn test_serde_validates() {
        let token: ExamToken = serde_json::from_str("\"xyz234\"").unwrap();
        assert_eq!(token.as_str(), "XYZ234");
        assert!(serde_json::from_str::<ExamToken>("\"nope\"").is_err());
    }
}
