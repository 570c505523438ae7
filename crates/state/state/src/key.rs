use serde::{Deserialize, Serialize};

/// The kind of state being stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    /// Cached platform access token.
    Token,
    /// Idempotency mark for an already-observed email.
    Seen,
    /// Authentication lockout flag.
    Lockout,
    /// Failed-authentication counter feeding the lockout.
    AuthAttempts,
    /// Rate-limit window data.
    RateLimit,
    /// Polling high-watermark.
    Watermark,
    Custom(String),
}

impl KeyKind {
    /// Return a string representation of the key kind.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Token => "token",
            Self::Seen => "seen",
            Self::Lockout => "lockout",
            Self::AuthAttempts => "auth_attempts",
            Self::RateLimit => "rate_limit",
            Self::Watermark => "watermark",
            Self::Custom(s) => s.as_str(),
        }
    }
}

impl std::fmt::Display for KeyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key used to address entries in the state store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateKey {
    pub kind: KeyKind,
    pub id: String,
}

impl StateKey {
    /// Create a new state key.
    #[must_use]
    pub fn new(kind: KeyKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    /// Return a canonical string representation: `kind:id`.
    #[must_use]
    pub fn canonical(&self) -> String {
        format!("{}:{}", self.kind, self.id)
    }
}

impl std::fmt::Display for StateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.canonical())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_kind_as_str() {
        assert_eq!(KeyKind::Token.as_str(), "token");
        assert_eq!(KeyKind::Seen.as_str(), "seen");
        assert_eq!(KeyKind::Lockout.as_str(), "lockout");
        assert_eq!(KeyKind::AuthAttempts.as_str(), "auth_attempts");
        assert_eq!(KeyKind::RateLimit.as_str(), "rate_limit");
        assert_eq!(KeyKind::Watermark.as_str(), "watermark");
        assert_eq!(KeyKind::Custom("foo".into()).as_str(), "foo");
    }

    #[test]
    fn state_key_canonical() {
        let key = StateKey::new(KeyKind::Seen, "msg-1");
        assert_eq!(key.canonical(), "seen:msg-1");
        assert_eq!(key.to_string(), "seen:msg-1");
    }
}
