//! Structural validation for financial (0200) requests.

use chrono::{NaiveDate, NaiveTime, Utc};
use chrono::Datelike;

use crate::iso_message::IsoMessage;

const REQUIRED_FIELDS: [u8; 7] = [2, 3, 4, 7, 11, 41, 49];

#[derive(Debug, Clone)]
pub struct ValidationResult {
    errors: Vec<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self { errors: Vec::new() }
    }

    pub fn failed(errors: Vec<String>) -> Self {
        Self { errors }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn summary(&self) -> String {
        self.errors.join("; ")
    }
}

pub fn validate_financial(msg: &IsoMessage) -> ValidationResult {
    let mut errors = Vec::new();

    for field in REQUIRED_FIELDS {
        match msg.field(field) {
            Some(f) if !f.is_empty() => {}
            Some(_) => errors.push(format!("Field {} is empty", field)),
            None => errors.push(format!("Field {} missing", field)),
        }
    }

    if let Some(pan) = msg.string_value(2) {
        if pan.trim().len() < 13 {
            errors.push("Field 2 PAN shorter than 13 digits".to_string());
        }
    }

    if let Some(amount) = msg.string_value(4) {
        if amount.len() != 12 || !amount.bytes().all(|b| b.is_ascii_digit()) {
            errors.push("Field 4 must be 12 ASCII digits".to_string());
        }
    }

    if let Some(date) = msg.string_value(7) {
        if !is_valid_date10(&date) {
            errors.push("Field 7 is not a valid MMddHHmmss value".to_string());
        }
    }

    if let Some(currency) = msg.string_value(49) {
        if currency.len() != 3 || !currency.bytes().all(|b| b.is_ascii_digit()) {
            errors.push("Field 49 must be exactly 3 digits".to_string());
        }
    }

    if errors.is_empty() {
        ValidationResult::ok()
    } else {
        ValidationResult::failed(errors)
    }
}

fn is_valid_date10(value: &str) -> bool {
    if value.len() != 10 || !value.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let month: u32 = value[0..2].parse().unwrap_or(0);
    let day: u32 = value[2..4].parse().unwrap_or(0);
    let hour: u32 = value[4..6].parse().unwrap_or(99);
    let minute: u32 = value[6..8].parse().unwrap_or(99);
    let second: u32 = value[8..10].parse().unwrap_or(99);
    // interpreted against the current year, like the JSON expansion does
    let year = Utc::now().year();
    NaiveDate::from_ymd_opt(year, month, day).is_some()
        && NaiveTime::from_hms_opt(hour, minute, second).is_some()
}
