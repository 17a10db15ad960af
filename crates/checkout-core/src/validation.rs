//! Advisory Field Validation
//!
//! Local checks for the address and contact forms. These never gate
//! initialization of the hosted fields; the provider performs its own
//! validation before it will tokenize.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{CheckoutError, Result};

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid regex"));
static CARD_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{13,19}$").expect("valid regex"));
static PERSON_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z\s'-]{1,50}$").expect("valid regex"));
static ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9\s.,#/-]{1,100}$").expect("valid regex"));
static CITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z\s-]{1,50}$").expect("valid regex"));
static ZIP_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{5}(-\d{4})?$").expect("valid regex"));
static PHONE_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^1?\d{10}$").expect("valid regex"));

/// Validation rule attached to a form input
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldRule {
    Email,
    CardNumber,
    FirstName,
    LastName,
    Address,
    City,
    ZipCode,
    PhoneNumber,
}

impl FieldRule {
    /// Name used in the input's `data-validation-type`
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::CardNumber => "cardNumber",
            Self::FirstName => "firstName",
            Self::LastName => "lastName",
            Self::Address => "address",
            Self::City => "city",
            Self::ZipCode => "zipCode",
            Self::PhoneNumber => "phoneNumber",
        }
    }

    pub const fn error_message(self) -> &'static str {
        match self {
            Self::Email => "Please enter a valid email address",
            Self::CardNumber => "Please enter a valid credit card number",
            Self::FirstName => "Please enter a valid first name",
            Self::LastName => "Please enter a valid last name",
            Self::Address => "Please enter a valid address",
            Self::City => "Please enter a valid city",
            Self::ZipCode => "Please enter a valid ZIP code",
            Self::PhoneNumber => "Please enter a valid phone number",
        }
    }

    pub fn is_valid(self, value: &str) -> bool {
        let trimmed = value.trim();
        match self {
            Self::Email => EMAIL.is_match(trimmed),
            Self::CardNumber => {
                let digits: String = value.chars().filter(|c| !c.is_whitespace()).collect();
                CARD_DIGITS.is_match(&digits) && luhn_check(&digits)
            }
            Self::FirstName | Self::LastName => PERSON_NAME.is_match(trimmed),
            Self::Address => ADDRESS.is_match(trimmed),
            Self::City => CITY.is_match(trimmed),
            Self::ZipCode => ZIP_CODE.is_match(trimmed),
            Self::PhoneNumber => {
                let digits: String = value
                    .chars()
                    .filter(|c| !(c.is_whitespace() || matches!(c, '(' | ')' | '-' | '+')))
                    .collect();
                PHONE_DIGITS.is_match(&digits)
            }
        }
    }

    /// Strict check
    pub fn validate(self, value: &str) -> Result<()> {
        if self.is_valid(value) {
            Ok(())
        } else {
            Err(CheckoutError::Validation {
                field: self.as_str().into(),
                message: self.error_message().into(),
            })
        }
    }

    /// As-you-type check: an empty input is not reported yet
    pub fn validate_input(self, value: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Ok(());
        }
        self.validate(value)
    }
}

impl FromStr for FieldRule {
    type Err = CheckoutError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "email" => Ok(Self::Email),
            "cardNumber" => Ok(Self::CardNumber),
            "firstName" => Ok(Self::FirstName),
            "lastName" => Ok(Self::LastName),
            "address" => Ok(Self::Address),
            "city" => Ok(Self::City),
            "zipCode" => Ok(Self::ZipCode),
            "phoneNumber" => Ok(Self::PhoneNumber),
            other => Err(CheckoutError::Config(format!(
                "unknown validation type: {other}"
            ))),
        }
    }
}

/// Luhn checksum over a string of ASCII digits
pub fn luhn_check(digits: &str) -> bool {
    let mut sum = 0u32;
    for (i, c) in digits.chars().rev().enumerate() {
        let Some(mut digit) = c.to_digit(10) else {
            return false;
        };
        if i % 2 == 1 {
            digit *= 2;
            if digit > 9 {
                digit -= 9;
            }
        }
        sum += digit;
    }
    sum % 10 == 0
}

/// Group card digits in blocks of four for display
pub fn format_card_number(input: &str) -> String {
    let digits: Vec<char> = input.chars().filter(|c| !c.is_whitespace()).collect();
    digits
        .chunks(4)
        .map(|chunk| chunk.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(" ")
}
