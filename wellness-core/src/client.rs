//! Client record types
//!
//! `ClientRecord` is the authoritative row owned by the system of record.
//! `SearchDocument` is its projection into the search index, and the cache
//! holds the record serialized as JSON under [`cache_key`].

use crate::{ValidationError, CACHE_KEY_PREFIX, MAX_FULL_NAME_LEN, MIN_FULL_NAME_LEN};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Numeric identity of a client. Zero is never a valid identity.
pub type ClientId = u64;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Cache key for a client: `client:{id}`.
pub fn cache_key(id: ClientId) -> String {
    format!("{}{}", CACHE_KEY_PREFIX, id)
}

/// Text fields of a [`SearchDocument`] that free-text queries run against.
pub const SEARCH_TEXT_FIELDS: [&str; 8] = [
    "full_name",
    "email",
    "phone",
    "advertising_channel",
    "meeting_place",
    "occupation",
    "gender",
    "reason_for_visit",
];

// ============================================================================
// CLIENT RECORD
// ============================================================================

/// Full snapshot of a client as held by the system of record.
///
/// Every event carries one of these in full, never a diff, so that a replayed
/// or reordered event still produces a valid end state by overwrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRecord {
    pub id: ClientId,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub advertising_channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialist_id: Option<u64>,
    #[serde(default)]
    pub meeting_place: String,
    #[serde(default)]
    pub occupation: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub age: u32,
    #[serde(default)]
    pub reason_for_visit: String,
    #[serde(default)]
    pub specialist_notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<Timestamp>,
}

impl ClientRecord {
    /// Materialize a draft under an assigned identity.
    pub fn from_draft(id: ClientId, draft: &NewClient, now: Timestamp) -> Self {
        Self {
            id,
            full_name: draft.full_name.clone(),
            email: draft.email.clone(),
            phone: draft.phone.clone(),
            advertising_channel: draft.advertising_channel.clone(),
            specialist_id: draft.specialist_id,
            meeting_place: draft.meeting_place.clone(),
            occupation: draft.occupation.clone(),
            gender: draft.gender.clone(),
            age: draft.age,
            reason_for_visit: draft.reason_for_visit.clone(),
            specialist_notes: draft.specialist_notes.clone(),
            created_at: Some(now),
            updated_at: Some(now),
        }
    }

    /// Replace every mutable field with the draft's values. Identity and
    /// creation time are kept.
    pub fn apply(&mut self, draft: &NewClient, now: Timestamp) {
        let created_at = self.created_at.or(Some(now));
        *self = Self::from_draft(self.id, draft, now);
        self.created_at = created_at;
    }

    pub fn cache_key(&self) -> String {
        cache_key(self.id)
    }
}

// ============================================================================
// DRAFT (write-path input)
// ============================================================================

/// Client fields supplied by a caller on create or update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewClient {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    #[serde(default)]
    pub advertising_channel: String,
    #[serde(default)]
    pub specialist_id: Option<u64>,
    #[serde(default)]
    pub meeting_place: String,
    #[serde(default)]
    pub occupation: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub age: u32,
    #[serde(default)]
    pub reason_for_visit: String,
    #[serde(default)]
    pub specialist_notes: String,
}

impl NewClient {
    /// Minimal draft with the three required fields.
    pub fn new(
        full_name: impl Into<String>,
        email: impl Into<String>,
        phone: impl Into<String>,
    ) -> Self {
        Self {
            full_name: full_name.into(),
            email: email.into(),
            phone: phone.into(),
            ..Self::default()
        }
    }

    /// Check the required fields: name length, address shape and E.164 phone.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let name_len = self.full_name.trim().chars().count();
        if name_len == 0 {
            return Err(ValidationError::RequiredFieldMissing {
                field: "full_name".to_string(),
            });
        }
        if !(MIN_FULL_NAME_LEN..=MAX_FULL_NAME_LEN).contains(&name_len) {
            return Err(ValidationError::InvalidValue {
                field: "full_name".to_string(),
                reason: format!(
                    "must be between {} and {} characters",
                    MIN_FULL_NAME_LEN, MAX_FULL_NAME_LEN
                ),
            });
        }

        if self.email.is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "email".to_string(),
            });
        }
        if !is_email(&self.email) {
            return Err(ValidationError::InvalidValue {
                field: "email".to_string(),
                reason: "must be a valid email address".to_string(),
            });
        }

        if self.phone.is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "phone".to_string(),
            });
        }
        if !is_e164(&self.phone) {
            return Err(ValidationError::InvalidValue {
                field: "phone".to_string(),
                reason: "must be an E.164 number such as +14155552671".to_string(),
            });
        }

        Ok(())
    }
}

/// `local@domain.tld`, no whitespace, no empty domain labels.
static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@.]+(\.[^\s@.]+)+$").expect("Invalid email regex")
});

/// `+`, optional country digit, then 7 to 14 digits.
static E164_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+[1-9]?[0-9]{7,14}$").expect("Invalid E.164 regex"));

fn is_email(value: &str) -> bool {
    EMAIL_REGEX.is_match(value)
}

fn is_e164(value: &str) -> bool {
    E164_REGEX.is_match(value)
}

// ============================================================================
// SEARCH DOCUMENT
// ============================================================================

/// Projection of a client into the search index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchDocument {
    pub id: ClientId,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub advertising_channel: String,
    #[serde(default)]
    pub meeting_place: String,
    #[serde(default)]
    pub occupation: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub age: u32,
    #[serde(default)]
    pub reason_for_visit: String,
}

impl From<&ClientRecord> for SearchDocument {
    fn from(record: &ClientRecord) -> Self {
        Self {
            id: record.id,
            full_name: record.full_name.clone(),
            email: record.email.clone(),
            phone: record.phone.clone(),
            advertising_channel: record.advertising_channel.clone(),
            meeting_place: record.meeting_place.clone(),
            occupation: record.occupation.clone(),
            gender: record.gender.clone(),
            age: record.age,
            reason_for_visit: record.reason_for_visit.clone(),
        }
    }
}

impl SearchDocument {
    fn text_fields(&self) -> [&str; 8] {
        [
            &self.full_name,
            &self.email,
            &self.phone,
            &self.advertising_channel,
            &self.meeting_place,
            &self.occupation,
            &self.gender,
            &self.reason_for_visit,
        ]
    }

    /// Every whitespace-separated term must appear, case-insensitively, in
    /// at least one text field. A blank query matches nothing.
    pub fn matches(&self, query: &str) -> bool {
        let terms: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
        if terms.is_empty() {
            return false;
        }
        let fields: Vec<String> = self
            .text_fields()
            .iter()
            .map(|field| field.to_lowercase())
            .collect();
        terms
            .iter()
            .all(|term| fields.iter().any(|field| field.contains(term.as_str())))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ClientRecord {
        ClientRecord::from_draft(
            1,
            &NewClient {
                occupation: "Marine Biologist".to_string(),
                ..NewClient::new("Ada Lovelace", "ada@example.com", "+14155552671")
            },
            Utc::now(),
        )
    }

    #[test]
    fn test_cache_key_format() {
        assert_eq!(cache_key(42), "client:42");
        assert_eq!(record().cache_key(), "client:1");
    }

    #[test]
    fn test_record_deserializes_with_missing_optional_fields() {
        let record: ClientRecord = serde_json::from_str(
            r#"{"id":1,"full_name":"A","email":"a@x.com","phone":"+10000000000"}"#,
        )
        .expect("minimal record should deserialize");
        assert_eq!(record.id, 1);
        assert_eq!(record.full_name, "A");
        assert_eq!(record.age, 0);
        assert!(record.specialist_id.is_none());
        assert!(record.created_at.is_none());
    }

    #[test]
    fn test_apply_keeps_identity_and_creation_time() {
        let mut current = record();
        let created = current.created_at;
        let later = Utc::now() + chrono::Duration::seconds(10);

        current.apply(
            &NewClient::new("Grace Hopper", "grace@example.com", "+14155550000"),
            later,
        );

        assert_eq!(current.id, 1);
        assert_eq!(current.full_name, "Grace Hopper");
        assert_eq!(current.created_at, created);
        assert_eq!(current.updated_at, Some(later));
        assert!(current.occupation.is_empty());
    }

    #[test]
    fn test_validate_accepts_good_draft() {
        let draft = NewClient::new("Ada Lovelace", "ada@example.com", "+14155552671");
        assert!(draft.validate().is_ok());
    }

    #[test]
    fn test_validate_full_name_bounds() {
        let short = NewClient::new("A", "a@x.com", "+14155552671");
        assert!(matches!(
            short.validate(),
            Err(ValidationError::InvalidValue { ref field, .. }) if field == "full_name"
        ));

        let long = NewClient::new("x".repeat(101), "a@x.com", "+14155552671");
        assert!(long.validate().is_err());

        let blank = NewClient::new("   ", "a@x.com", "+14155552671");
        assert!(matches!(
            blank.validate(),
            Err(ValidationError::RequiredFieldMissing { .. })
        ));
    }

    #[test]
    fn test_validate_email_shape() {
        for good in ["a@x.com", "first.last+tag@mail.example.org"] {
            assert!(is_email(good), "{good} should be accepted");
        }
        for bad in ["plain", "@x.com", "a@x", "a@.com", "a b@x.com", "a@x..com", "a@b@x.com"] {
            let draft = NewClient::new("Ada", bad, "+14155552671");
            assert!(draft.validate().is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_validate_phone_e164() {
        for good in ["+10000000000", "+4930123456", "+1234567"] {
            assert!(is_e164(good), "{good} should be accepted");
        }
        for bad in [
            "14155552671",
            "+1",
            "+1415555abcd",
            "+1234567890123456",
            "+012345678901234",
            "+1 415 555 2671",
        ] {
            assert!(!is_e164(bad), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_search_document_projection() {
        let record = record();
        let doc = SearchDocument::from(&record);
        assert_eq!(doc.id, record.id);
        assert_eq!(doc.full_name, record.full_name);
        assert_eq!(doc.occupation, "Marine Biologist");
    }

    #[test]
    fn test_search_document_matches_terms_across_fields() {
        let doc = SearchDocument::from(&record());
        assert!(doc.matches("ada"));
        assert!(doc.matches("LOVELACE marine"));
        assert!(doc.matches("example.com"));
        assert!(!doc.matches("ada hopper"));
        assert!(!doc.matches(""));
        assert!(!doc.matches("   "));
    }
}
