use cw_api_types::ShippingAddressPayload;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CheckoutError {
    #[error("cart is empty")]
    EmptyCart,
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("card number must have 13 to 19 digits")]
    CardFormat,
    #[error("card number failed the checksum")]
    CardChecksum,
    #[error("expiry must be MM/YY")]
    InvalidExpiry,
    #[error("security code must be 3 digits")]
    InvalidCvv,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShippingDetails {
    pub first_name: String,
    pub last_name: String,
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub phone: String,
}

impl ShippingDetails {
    pub fn validate(&self) -> Result<(), CheckoutError> {
        let fields = [
            ("first name", &self.first_name),
            ("last name", &self.last_name),
            ("address", &self.address),
            ("city", &self.city),
            ("postal code", &self.postal_code),
            ("phone", &self.phone),
        ];
        match fields.iter().find(|(_, value)| value.trim().is_empty()) {
            Some((name, _)) => Err(CheckoutError::MissingField(*name)),
            None => Ok(()),
        }
    }

    pub fn to_payload(&self) -> ShippingAddressPayload {
        ShippingAddressPayload {
            first_name: self.first_name.trim().to_owned(),
            last_name: self.last_name.trim().to_owned(),
            address: self.address.trim().to_owned(),
            city: self.city.trim().to_owned(),
            postal_code: self.postal_code.trim().to_owned(),
            phone: self.phone.trim().to_owned(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentCard {
    pub number: String,
    pub holder: String,
    pub expiry: String,
    pub cvv: String,
}

impl PaymentCard {
    pub fn validate(&self) -> Result<(), CheckoutError> {
        let digits = sanitize_card_number(&self.number);
        if !(13..=19).contains(&digits.len()) || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CheckoutError::CardFormat);
        }
        if !luhn_valid(&digits) {
            return Err(CheckoutError::CardChecksum);
        }
        if self.holder.trim().is_empty() {
            return Err(CheckoutError::MissingField("cardholder"));
        }
        if !valid_expiry(self.expiry.trim()) {
            return Err(CheckoutError::InvalidExpiry);
        }
        let cvv = self.cvv.trim();
        if cvv.len() != 3 || !cvv.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CheckoutError::InvalidCvv);
        }
        Ok(())
    }

    /// Last four digits, for receipts and logs.
    pub fn masked(&self) -> String {
        let digits = sanitize_card_number(&self.number);
        let tail = digits.get(digits.len().saturating_sub(4)..).unwrap_or_default();
        format!("**** {tail}")
    }
}

pub fn sanitize_card_number(input: &str) -> String {
    input.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Mod-10 checksum over an all-digit string.
pub fn luhn_valid(digits: &str) -> bool {
    let mut sum = 0u32;
    for (index, c) in digits.chars().rev().enumerate() {
        let Some(mut digit) = c.to_digit(10) else {
            return false;
        };
        if index % 2 == 1 {
            digit *= 2;
            if digit > 9 {
                digit -= 9;
            }
        }
        sum += digit;
    }
    !digits.is_empty() && sum % 10 == 0
}

fn valid_expiry(raw: &str) -> bool {
    let Some((month, year)) = raw.split_once('/') else {
        return false;
    };
    let two_digits = |part: &str| part.len() == 2 && part.bytes().all(|b| b.is_ascii_digit());
    if !two_digits(month) || !two_digits(year) {
        return false;
    }
    matches!(month.parse::<u8>(), Ok(1..=12))
}
