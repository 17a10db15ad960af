//! Checkout Domain Models
//!
//! Uses `rust_decimal` for all monetary values.

use chrono::{DateTime, Utc};
use checkout_core::validation::FieldRule;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{PaymentError, Result};

/// One pair of shoes in the cart
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShoeSelection {
    pub color: String,
    pub size: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

const fn default_quantity() -> u32 {
    1
}

impl ShoeSelection {
    pub fn new(color: impl Into<String>, size: impl Into<String>) -> Self {
        Self {
            color: color.into(),
            size: size.into(),
            quantity: 1,
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.color.trim().is_empty() && !self.size.trim().is_empty()
    }
}

/// Postal address as entered in the shipping or billing form
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressData {
    pub first_name: String,
    pub last_name: String,
    pub address1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address2: Option<String>,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

fn default_country() -> String {
    "US".into()
}

impl AddressData {
    /// Trim every field, drop blank optionals, default the country to US
    #[must_use]
    pub fn normalized(self) -> Self {
        let optional = |value: Option<String>| {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let country = self.country.trim().to_string();

        Self {
            first_name: self.first_name.trim().into(),
            last_name: self.last_name.trim().into(),
            address1: self.address1.trim().into(),
            address2: optional(self.address2),
            city: self.city.trim().into(),
            state: self.state.trim().into(),
            zip_code: self.zip_code.trim().into(),
            country: if country.is_empty() { default_country() } else { country },
            phone: optional(self.phone),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// Advisory checks on the fields the form validates as you type
    pub fn validate(&self) -> Result<()> {
        FieldRule::FirstName.validate(&self.first_name)?;
        FieldRule::LastName.validate(&self.last_name)?;
        FieldRule::Address.validate(&self.address1)?;
        FieldRule::City.validate(&self.city)?;
        FieldRule::ZipCode.validate(&self.zip_code)?;
        if let Some(phone) = &self.phone {
            FieldRule::PhoneNumber.validate(phone)?;
        }
        Ok(())
    }
}

/// Everything the checkout form collected, minus the card
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutPayload {
    pub items: Vec<ShoeSelection>,
    pub shipping_address: AddressData,
    /// `None` when billing is the same as shipping
    pub billing_address: Option<AddressData>,
    pub email: String,
    pub total_amount: Decimal,
}

impl CheckoutPayload {
    pub fn validate(&self) -> Result<()> {
        if self.items.is_empty() {
            return Err(PaymentError::EmptyCart);
        }
        if let Some(item) = self.items.iter().find(|item| !item.is_complete()) {
            return Err(PaymentError::IncompleteSelection(format!(
                "color '{}' size '{}'",
                item.color, item.size
            )));
        }
        if self.total_amount <= Decimal::ZERO {
            return Err(PaymentError::InvalidRequest("total amount must be positive".into()));
        }
        FieldRule::Email.validate(&self.email)?;
        self.shipping_address.validate()?;
        if let Some(billing) = &self.billing_address {
            billing.validate()?;
        }
        Ok(())
    }
}

/// Order lifecycle as shown on the confirmation page
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Confirmed,
}

/// Completed order kept in scratch storage for the confirmation page
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRecord {
    pub order_id: String,
    pub transaction_id: Option<String>,
    pub items: Vec<ShoeSelection>,
    pub shipping_address: Option<AddressData>,
    pub billing_address: Option<AddressData>,
    pub email: Option<String>,
    pub total_amount: Decimal,
    pub order_date: DateTime<Utc>,
    pub status: OrderStatus,
}
