use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ContactMethodType {
    Email,
    Phone,
}

/// An email address or phone number bound to a profile. At most one
/// *verified* profile may own a given (type, value) pair at a time.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContactMethod {
    pub id: String,
    #[serde(rename = "type")]
    pub method_type: ContactMethodType,
    #[schema(example = "alice@example.com")]
    pub value: String,
    pub is_verified: bool,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
}

/// A normalized (type, value) pair, the unit the exclusivity invariant
/// is keyed on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContactIdentifier {
    #[serde(rename = "type")]
    pub method_type: ContactMethodType,
    pub value: String,
}

impl ContactIdentifier {
    /// Normalize on construction: emails fold to lowercase, phone values
    /// keep a leading `+` and digits only.
    pub fn new(method_type: ContactMethodType, value: &str) -> Self {
        let value = match method_type {
            ContactMethodType::Email => value.trim().to_ascii_lowercase(),
            ContactMethodType::Phone => {
                let trimmed = value.trim();
                let mut out = String::with_capacity(trimmed.len());
                for (i, c) in trimmed.chars().enumerate() {
                    if c.is_ascii_digit() || (i == 0 && c == '+') {
                        out.push(c);
                    }
                }
                out
            }
        };
        Self { method_type, value }
    }

    /// Classify a recipient string by shape. Anything that is neither an
    /// email nor a phone number is treated as a profile identifier by
    /// callers.
    pub fn detect(recipient: &str) -> Option<Self> {
        let trimmed = recipient.trim();
        if looks_like_email(trimmed) {
            return Some(Self::new(ContactMethodType::Email, trimmed));
        }
        if looks_like_phone(trimmed) {
            return Some(Self::new(ContactMethodType::Phone, trimmed));
        }
        None
    }
}

fn looks_like_email(s: &str) -> bool {
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

fn looks_like_phone(s: &str) -> bool {
    let digits = s.strip_prefix('+').unwrap_or(s);
    let digits: String = digits
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();
    digits.len() >= 7 && digits.len() <= 15 && digits.chars().all(|c| c.is_ascii_digit())
}
