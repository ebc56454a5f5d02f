//! ISO request -> canonical JSON document for the ESB.

use chrono::{Datelike, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Value};

use crate::errors::GatewayError;
use crate::iso_message::{FieldValue, IsoMessage};
use crate::models::TransactionType;

/// Fields with a dedicated JSON key; everything else lands in `rawFields`.
const CONSUMED: [u8; 22] = [2, 3, 4, 7, 11, 12, 13, 32, 37, 38, 39, 41, 42, 43, 44, 49, 54, 55, 62, 64, 102, 123];

pub fn convert(msg: &IsoMessage) -> Result<Value, GatewayError> {
    let mut json = Map::new();
    json.insert("messageType".to_string(), Value::String(msg.mti_str()));

    if let Some(pan) = msg.string_value(2) {
        json.insert("cardNumber".to_string(), Value::String(mask_pan(&pan)));
        json.insert("accountNumber".to_string(), Value::String(pan));
    }
    if let Some(proc_code) = msg.string_value(3) {
        json.insert(
            "transactionType".to_string(),
            Value::String(TransactionType::from_processing_code(&proc_code).as_str().to_string()),
        );
        json.insert("processingCode".to_string(), Value::String(proc_code));
    }
    if let Some(amount) = msg.string_value(4) {
        let minor: i64 = amount
            .trim()
            .parse()
            .map_err(|_| GatewayError::Internal(format!("field 4 is not numeric: '{}'", amount)))?;
        let major = (Decimal::from(minor) / Decimal::from(100)).normalize();
        json.insert("amountMinor".to_string(), Value::String(amount));
        json.insert("amount".to_string(), Value::String(major.to_string()));
        json.insert("amountValue".to_string(), Value::String(major.to_string()));
    }
    if let Some(date) = msg.string_value(7) {
        json.insert("transmissionDateTime".to_string(), Value::String(expand_date10(&date)));
    }
    if let Some(stan) = msg.string_value(11) {
        json.insert("stan".to_string(), Value::String(stan));
    }
    if let Some(time_local) = msg.string_value(12) {
        json.insert("timeLocal".to_string(), Value::String(time_local));
    }
    if let Some(date_local) = msg.string_value(13) {
        json.insert("dateLocal".to_string(), Value::String(date_local));
    }
    if let Some(acquirer) = msg.string_value(32) {
        json.insert("acquiringInstitutionId".to_string(), Value::String(acquirer));
    }
    if let Some(rrn) = msg.string_value(37) {
        json.insert("rrn".to_string(), Value::String(rrn));
    }
    if let Some(auth) = msg.string_value(38) {
        json.insert("authorizationCode".to_string(), Value::String(auth));
    }
    if let Some(rc) = msg.string_value(39) {
        json.insert("responseCode".to_string(), Value::String(rc));
    }
    if let Some(terminal) = msg.string_value(41) {
        json.insert("terminalId".to_string(), Value::String(terminal.trim().to_string()));
    }
    if let Some(merchant) = msg.string_value(42) {
        json.insert("merchantId".to_string(), Value::String(merchant));
    }
    if let Some(merchant_info) = msg.string_value(43) {
        json.insert("merchantInfo".to_string(), Value::String(merchant_info));
    }
    if let Some(additional) = msg.string_value(44) {
        json.insert("additionalResponseData".to_string(), Value::String(additional));
    }
    if let Some(currency) = msg.string_value(49) {
        json.insert("currencyCode".to_string(), Value::String(currency));
    }
    if let Some(balance) = msg.string_value(54) {
        json.insert("balanceData".to_string(), Value::String(balance));
    }
    if let Some(emv) = msg.string_value(55) {
        json.insert("emvDataBase64".to_string(), Value::String(emv));
    }
    if let Some(mini) = msg.string_value(62) {
        json.insert("miniStatement".to_string(), Value::String(mini));
    }
    if let Some(mac) = msg.string_value(64) {
        json.insert("macBase64".to_string(), Value::String(mac));
    }
    if let Some(from_account) = msg.string_value(102) {
        json.insert("fromAccount".to_string(), Value::String(from_account));
    }
    if let Some(private) = msg.string_value(123) {
        json.insert("privateData".to_string(), Value::String(private));
    }

    let mut raw = Map::new();
    for (number, field) in msg.iter() {
        if CONSUMED.contains(&number) {
            continue;
        }
        match &field.value {
            FieldValue::Composite(nested) => {
                for (sub, sub_field) in nested.iter() {
                    if let Some(rendered) = sub_field.render() {
                        raw.insert(format!("{}.{}", number, sub), Value::String(rendered));
                    }
                }
            }
            _ => {
                if let Some(rendered) = field.render() {
                    raw.insert(number.to_string(), Value::String(rendered));
                }
            }
        }
    }
    json.insert("rawFields".to_string(), Value::Object(raw));

    Ok(Value::Object(json))
}

fn mask_pan(pan: &str) -> String {
    if pan.len() < 13 {
        return "****".to_string();
    }
    format!("{}******{}", &pan[..6], &pan[pan.len() - 4..])
}

/// A 10-digit field 7 is MMddHHmmss; expand it against the current year.
fn expand_date10(value: &str) -> String {
    if value.len() == 10 && value.bytes().all(|b| b.is_ascii_digit()) {
        let year = Utc::now().year();
        return format!(
            "{}-{}-{}T{}:{}:{}",
            year,
            &value[0..2],
            &value[2..4],
            &value[4..6],
            &value[6..8],
            &value[8..10]
        );
    }
    value.to_string()
}
