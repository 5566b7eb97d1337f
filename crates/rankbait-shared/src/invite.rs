use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::constants::{INVITE_ALPHABET, INVITE_CODE_LEN};
use crate::error::ValidationError;

/// Short human-enterable code that resolves to one group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InviteCode(String);

impl InviteCode {
    /// Draw `INVITE_CODE_LEN` independent symbols from the invite alphabet.
    pub fn generate() -> Self {
        Self::generate_with(&mut rand::thread_rng())
    }

    pub fn generate_with<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let code = (0..INVITE_CODE_LEN)
            .map(|_| INVITE_ALPHABET[rng.gen_range(0..INVITE_ALPHABET.len())] as char)
            .collect();
        Self(code)
    }

    /// Parse a freshly typed code, rejecting anything the generator could
    /// not have produced.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let normalized = normalize(input);
        let valid = normalized.len() == INVITE_CODE_LEN
            && normalized.bytes().all(|b| INVITE_ALPHABET.contains(&b));
        if !valid {
            return Err(ValidationError::InvalidInviteCode(input.trim().to_string()));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InviteCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical lookup form of a typed code: surrounding whitespace dropped,
/// letters uppercased.
pub fn normalize(input: &str) -> String {
    input.trim().to_uppercase()
}
