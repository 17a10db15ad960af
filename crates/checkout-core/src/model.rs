//! Domain Types
//!
//! Transient values that flow between the tokenization provider, the
//! controller, and the host form. None of these outlive a page session.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Short-lived authorization token used to initialize the hosted fields
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientToken(String);

impl ClientToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Tokens grant access to the merchant account; keep them out of logs.
impl std::fmt::Debug for ClientToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ClientToken(<{} bytes>)", self.0.len())
    }
}

/// Opaque fraud-detection fingerprint; empty when collection failed
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceFingerprint(String);

impl DeviceFingerprint {
    pub fn new(data: impl Into<String>) -> Self {
        Self(data.into())
    }

    /// Fingerprint used when collection is unavailable
    pub fn empty() -> Self {
        Self(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Single-use payment method nonce
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Nonce(String);

impl Nonce {
    pub fn new(nonce: impl Into<String>) -> Self {
        Self(nonce.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Nonce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Card-entry fields rendered by the provider
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldName {
    Number,
    Cvv,
    ExpirationDate,
}

impl FieldName {
    /// Every field that must be valid before the form can tokenize
    pub const ALL: [Self; 3] = [Self::Number, Self::Cvv, Self::ExpirationDate];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::Cvv => "cvv",
            Self::ExpirationDate => "expirationDate",
        }
    }
}

/// Provider-reported state of one field
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldState {
    pub is_valid: bool,
    #[serde(default)]
    pub is_potentially_valid: bool,
    #[serde(default)]
    pub is_empty: bool,
    #[serde(default)]
    pub is_focused: bool,
}

impl FieldState {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            is_potentially_valid: true,
            ..Default::default()
        }
    }

    pub fn invalid() -> Self {
        Self::default()
    }
}

/// Per-field validity map carried by a validity event
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldStates(BTreeMap<FieldName, FieldState>);

impl FieldStates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    #[must_use]
    pub fn with(mut self, field: FieldName, state: FieldState) -> Self {
        self.0.insert(field, state);
        self
    }

    /// All three fields valid
    pub fn all_valid() -> Self {
        FieldName::ALL
            .into_iter()
            .fold(Self::new(), |states, field| states.with(field, FieldState::valid()))
    }

    pub fn get(&self, field: FieldName) -> Option<&FieldState> {
        self.0.get(&field)
    }

    /// True iff every required field is present and valid
    pub fn is_form_valid(&self) -> bool {
        FieldName::ALL
            .iter()
            .all(|field| self.0.get(field).is_some_and(|s| s.is_valid))
    }
}

/// Event emitted by the hosted fields
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldEvent {
    ValidityChange(FieldStates),
    Focus(FieldName),
}

/// Payload handed to the host once tokenization succeeds
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenizedPayment {
    pub nonce: Nonce,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_data: Option<DeviceFingerprint>,
}

impl TokenizedPayment {
    /// Empty fingerprints are dropped rather than sent as `""`
    pub fn new(nonce: Nonce, device_data: &DeviceFingerprint) -> Self {
        Self {
            nonce,
            device_data: (!device_data.is_empty()).then(|| device_data.clone()),
        }
    }
}
