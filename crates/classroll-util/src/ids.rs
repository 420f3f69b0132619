//! Strongly-typed identifiers for classroll

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Namespace for name-based participant tokens
const PARTICIPANT_NAMESPACE: Uuid = Uuid::from_u128(0x7d4f_2c1e_9a3b_4e58_b6c0_1f2a_8e9d_3c47);

/// Stable identity of one logical participant within one session.
///
/// Derived from a normalized `name|subject|session` composite, so minor
/// formatting differences in the captured display name (case, spacing,
/// punctuation) map to the same token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParticipantToken(Uuid);

impl ParticipantToken {
    pub fn derive(name: &str, subject: &str, session: &str) -> Self {
        let composite = format!(
            "{}|{}|{}",
            normalize_identity(name),
            normalize_identity(subject),
            normalize_identity(session)
        );
        Self(Uuid::new_v5(&PARTICIPANT_NAMESPACE, composite.as_bytes()))
    }
}

impl fmt::Display for ParticipantToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lower-case, drop punctuation, collapse runs of whitespace.
pub fn normalize_identity(raw: &str) -> String {
    let mut cleaned = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_alphanumeric() {
            cleaned.extend(c.to_lowercase());
        } else if c.is_whitespace() || matches!(c, '-' | '_' | '.') {
            cleaned.push(' ');
        }
    }

    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Correlation key for one scheduled meeting instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Key a meet code to the date it ran on; the same code is reused
    /// across the semester.
    pub fn for_meeting(meet_code: &str, date: Option<NaiveDate>) -> Self {
        let code = meet_code.trim().to_lowercase();
        match date {
            Some(date) => Self(format!("{}@{}", code, date.format("%Y-%m-%d"))),
            None => Self(code),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a subject (course) in the configuration
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubjectId(String);

impl SubjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SubjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SubjectId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_ignores_formatting_noise() {
        let a = ParticipantToken::derive("Ana  María Cruz", "CS101", "abc-defg-hij");
        let b = ParticipantToken::derive(" ana maría cruz ", "cs101", "ABC-DEFG-HIJ");
        let c = ParticipantToken::derive("Ana Maria Cruz", "CS101", "abc-defg-hij");

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn token_differs_across_sessions() {
        let a = ParticipantToken::derive("Jo Reyes", "CS101", "abc@2025-08-11");
        let b = ParticipantToken::derive("Jo Reyes", "CS101", "abc@2025-08-13");
        assert_ne!(a, b);
    }

    #[test]
    fn normalize_strips_punctuation() {
        assert_eq!(normalize_identity("Reyes, Jo (Student)"), "reyes jo student");
        assert_eq!(normalize_identity("jo.reyes_01"), "jo reyes 01");
        assert_eq!(normalize_identity("   "), "");
    }

    #[test]
    fn session_key_includes_date() {
        let date = NaiveDate::from_ymd_opt(2025, 8, 11).unwrap();
        let key = SessionKey::for_meeting(" ABC-defg-hij ", Some(date));
        assert_eq!(key.as_str(), "abc-defg-hij@2025-08-11");
        assert_eq!(SessionKey::for_meeting("abc", None).as_str(), "abc");
    }

    #[test]
    fn ids_serialize_deserialize() {
        let token = ParticipantToken::derive("Jo", "S", "K");
        let json = serde_json::to_string(&token).unwrap();
        let parsed: ParticipantToken = serde_json::from_str(&json).unwrap();
        assert_eq!(token, parsed);

        let subject = SubjectId::new("CS101");
        let json = serde_json::to_string(&subject).unwrap();
        let parsed: SubjectId = serde_json::from_str(&json).unwrap();
        assert_eq!(subject, parsed);
    }
}
