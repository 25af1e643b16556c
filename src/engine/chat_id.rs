//! Chat address type.

use std::fmt;

use crate::error::GatewayError;

/// Suffix the engine uses for one-to-one user chats.
pub const USER_CHAT_SUFFIX: &str = "@c.us";

/// Maximum accepted recipient length, before the suffix.
pub const MAX_RECIPIENT_LEN: usize = 64;

/// Engine chat address for a single recipient, e.g. `5511999999999@c.us`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChatId(String);

impl ChatId {
    /// Build the chat address for a bare phone/user identifier.
    ///
    /// Surrounding whitespace and a leading `+` are dropped. The remainder
    /// must be non-empty, at most [`MAX_RECIPIENT_LEN`] characters, and
    /// consist of ASCII alphanumerics, `-`, `_` or `.`.
    pub fn for_recipient(recipient: &str) -> crate::Result<Self> {
        let trimmed = recipient.trim();
        let bare = trimmed.strip_prefix('+').unwrap_or(trimmed);

        if bare.is_empty() {
            return Err(GatewayError::InvalidRecipient("empty recipient".into()));
        }
        if bare.len() > MAX_RECIPIENT_LEN {
            return Err(GatewayError::InvalidRecipient(format!(
                "recipient too long ({} > {})",
                bare.len(),
                MAX_RECIPIENT_LEN
            )));
        }
        if let Some(c) = bare
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(GatewayError::InvalidRecipient(format!(
                "unexpected character {:?} in {:?}",
                c, recipient
            )));
        }

        Ok(Self(format!("{}{}", bare, USER_CHAT_SUFFIX)))
    }

    /// Get the full chat address.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
