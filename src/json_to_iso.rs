//! ESB JSON reply -> ISO response message.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::Value;

use crate::builder::{response_from_request, truncate};
use crate::dictionary::MessageDictionary;
use crate::iso_message::IsoMessage;
use crate::iso_types::IsoType;
use crate::models::{EsbResponse, MiniStatementRecord};

const MINI_STATEMENT_MAX_RECORDS: usize = 10;
const MINI_STATEMENT_MAX_BYTES: usize = 999;

/// Map an ESB textual outcome onto an ISO field 39 code. Two-digit codes
/// pass through verbatim.
pub fn normalize_response_code(code: &str) -> String {
    let trimmed = code.trim();
    if trimmed.len() == 2 && trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return trimmed.to_string();
    }
    match trimmed.to_uppercase().as_str() {
        "OK" | "SUCCESS" | "APPROVED" | "APPROVAL" => "00",
        "INSUFFICIENT_FUNDS" | "INSUFFICIENT FUNDS" | "NOT_ENOUGH_FUNDS" => "51",
        "INVALID_ACCOUNT" | "ACCOUNT_NOT_FOUND" | "NO_ACCOUNT" => "14",
        "EXCEEDS_LIMIT" | "LIMIT_EXCEEDED" => "61",
        "AUTH_FAILED" | "DECLINED" => "05",
        "DUPLICATE" => "94",
        "TIMEOUT" | "UNAVAILABLE" | "SERVICE_UNAVAILABLE" => "96",
        _ => "96",
    }
    .to_string()
}

pub fn convert(dict: &MessageDictionary, resp: &EsbResponse, request: &IsoMessage) -> IsoMessage {
    let response_mti = request.mti() + 0x10;
    let original_code = resp.response_code.clone().unwrap_or_else(|| "96".to_string());
    let code = normalize_response_code(&original_code);

    // System errors collapse to a short 96 response
    if original_code.eq_ignore_ascii_case("SYSTEM_ERROR") || code == "96" {
        let mut error = response_from_request(dict, request, response_mti);
        error.set_text(39, IsoType::Alpha, 2, "96");
        let msg = resp.message.as_deref().unwrap_or("SYSTEM_ERROR");
        let msg = truncate(msg, 25);
        let len = msg.len();
        error.set_text(44, IsoType::Llvar, len, msg);
        return error;
    }

    let mut response = response_from_request(dict, request, response_mti);
    response.set_text(39, IsoType::Alpha, 2, &code);

    let auth = resp
        .authorization_code
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .or(resp.approval_code.as_deref())
        .filter(|s| !s.trim().is_empty());
    if let Some(auth) = auth {
        let code6 = if auth.len() > 6 { auth[..6].to_string() } else { format!("{:<6}", auth) };
        response.set_text(38, IsoType::Alpha, 6, code6);
    }

    if let Some(rrn) = resp.transaction_id.as_deref().filter(|s| !s.trim().is_empty()) {
        let rrn = if rrn.len() > 12 { &rrn[..12] } else { rrn };
        response.set_text(37, IsoType::Alpha, 12, rrn);
    }

    if let Some(stan) = resp.stan.as_deref().filter(|s| !s.trim().is_empty()) {
        let digits: String = stan.chars().filter(|c| c.is_ascii_digit()).collect();
        let last6 = if digits.len() > 6 { digits[digits.len() - 6..].to_string() } else { digits };
        let padded = format!("{:0>6}", if last6.is_empty() { "0".to_string() } else { last6 });
        response.set_text(11, IsoType::Numeric, 6, padded);
    }

    let amount_minor = resp
        .amount_minor
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(digits_only)
        .or_else(|| resp.amount.map(format_minor));
    if let Some(minor) = amount_minor {
        let minor = if minor.len() > 12 { minor[minor.len() - 12..].to_string() } else { minor };
        response.set_text(4, IsoType::Numeric, 12, format!("{:0>12}", minor));
    }

    if let Some(currency) = resp.currency.as_deref().filter(|s| !s.trim().is_empty()) {
        let currency = currency.trim();
        if currency.bytes().all(|b| b.is_ascii_digit()) {
            let len = currency.len().min(3);
            response.set_text(49, IsoType::Numeric, len, &currency[..len]);
        } else {
            let len = currency.len().min(3);
            response.set_text(49, IsoType::Alpha, len, &currency[..len]);
        }
    }

    if resp.available_balance.is_some() || resp.ledger_balance.is_some() {
        let currency = balance_currency(resp, request);
        let block = additional_amounts(resp.available_balance, resp.ledger_balance, &currency);
        let len = block.len();
        response.set_text(54, IsoType::Lllvar, len, block);
    }

    let is_mini = is_mini_statement_request(request);
    let statement_field = if is_mini { 48 } else { 62 };
    if let Some(text) = resp.mini_statement_text.as_deref().filter(|s| !s.trim().is_empty()) {
        let text = truncate(text, MINI_STATEMENT_MAX_BYTES);
        let len = text.len();
        response.set_text(statement_field, IsoType::Lllvar, len, text);
    } else if let Some(records) = resp.mini_statement.as_ref().filter(|r| !r.is_empty()) {
        let currency = balance_currency(resp, request);
        let text = render_mini_statement(records, &currency);
        let len = text.len();
        response.set_text(statement_field, IsoType::Lllvar, len, text);
    }

    if let Some(message) = resp.message.as_deref().filter(|s| !s.trim().is_empty()) {
        let message = truncate(message, 25);
        let len = message.len();
        response.set_text(44, IsoType::Llvar, len, message);
    }

    if let Some(mac) = resp.mac_base64.as_deref().filter(|s| !s.trim().is_empty()) {
        match BASE64.decode(mac) {
            Ok(mut bytes) => {
                bytes.resize(8, 0);
                response.set_bytes(64, IsoType::Binary, bytes);
            }
            Err(_) => {
                tracing::warn!(mac = mac, "invalid MAC base64 from ESB");
            }
        }
    }

    if let Some(from) = resp.from_account.as_deref().filter(|s| !s.trim().is_empty()) {
        let from = truncate(from, 28);
        let len = from.len();
        response.set_text(102, IsoType::Llvar, len, from);
    }
    if let Some(to) = resp.to_account.as_deref().filter(|s| !s.trim().is_empty()) {
        let to = truncate(to, 28);
        let len = to.len();
        response.set_text(103, IsoType::Llvar, len, to);
    }

    apply_raw_fields(&mut response, resp);

    response
}

/// rawFields pass-through: plain numeric keys land directly unless the
/// field is already populated; dotted keys group into a JSON object
/// serialized into the parent field.
fn apply_raw_fields(response: &mut IsoMessage, resp: &EsbResponse) {
    use std::collections::BTreeMap;
    let mut grouped: BTreeMap<u8, serde_json::Map<String, Value>> = BTreeMap::new();

    for (key, value) in &resp.raw_fields {
        if let Some((parent, sub)) = key.split_once('.') {
            if let Ok(parent) = parent.parse::<u8>() {
                grouped.entry(parent).or_default().insert(sub.to_string(), Value::String(value.clone()));
            }
            continue;
        }
        let Ok(field) = key.parse::<u8>() else { continue };
        if field < 2 || response.has_field(field) {
            continue;
        }
        if field == 64 {
            if let Ok(mut bytes) = BASE64.decode(value) {
                bytes.resize(8, 0);
                response.set_bytes(64, IsoType::Binary, bytes);
                continue;
            }
        }
        let text = truncate(value, 999);
        let len = text.len();
        response.set_text(field, IsoType::Lllvar, len, text);
    }

    for (parent, subs) in grouped {
        if response.has_field(parent) {
            continue;
        }
        let json = Value::Object(subs).to_string();
        let json = truncate(&json, 999);
        let len = json.len();
        response.set_text(parent, IsoType::Lllvar, len, json);
    }
}

/// Field 54 block: two 20-char segments, ledger ("01") then available
/// ("02"), each `AA TT CCC S NNNNNNNNNNNN`. A single present balance is
/// mirrored into the missing segment.
pub fn additional_amounts(available: Option<Decimal>, ledger: Option<Decimal>, currency: &str) -> String {
    let ledger = ledger.or(available);
    let available = available.or(ledger);
    let mut block = String::with_capacity(40);
    if let Some(ledger) = ledger {
        block.push_str(&balance_segment("01", ledger, currency));
    }
    if let Some(available) = available {
        block.push_str(&balance_segment("02", available, currency));
    }
    block
}

fn balance_segment(amount_type: &str, amount: Decimal, currency: &str) -> String {
    let sign = if amount.is_sign_negative() { 'D' } else { 'C' };
    let minor = (amount.abs() * Decimal::from(100))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_string();
    format!("00{}{:0>3}{}{:0>12}", amount_type, currency, sign, minor)
}

fn balance_currency(resp: &EsbResponse, request: &IsoMessage) -> String {
    resp.currency
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .or_else(|| request.string_value(49).map(|s| s.trim().to_string()).filter(|s| !s.is_empty()))
        .unwrap_or_else(|| "800".to_string())
}

fn is_mini_statement_request(request: &IsoMessage) -> bool {
    match request.string_value(3) {
        Some(proc_code) => {
            let proc_code = proc_code.trim().to_string();
            proc_code.starts_with("32")
                || proc_code.starts_with("38")
                || proc_code.eq_ignore_ascii_case("MINISTATEMENT")
                || proc_code.eq_ignore_ascii_case("MINI_STATEMENT")
        }
        None => false,
    }
}

/// Plain-text statement block: one `~`-terminated line per record,
/// `yyyyMMddHHmmss|NNNNNNNNNNNN|CCC CSH D|CCC`, at most 10 records,
/// truncated to 999 bytes.
fn render_mini_statement(records: &[MiniStatementRecord], currency: &str) -> String {
    let mut out = String::new();
    for record in records.iter().take(MINI_STATEMENT_MAX_RECORDS) {
        let date = record.date.as_deref().map(normalize_statement_date).unwrap_or_default();
        let minor = record.amount.as_ref().map(value_to_minor).unwrap_or_default();
        let dr_cr = match record.dr_cr.as_deref() {
            Some(s) if s.trim().to_uppercase().starts_with('C') => 'C',
            _ => 'D',
        };
        let record_currency = record.currency.as_deref().map(str::trim).filter(|s| !s.is_empty()).unwrap_or(currency);
        out.push_str(&format!("{}|{:0>12}|001 CSH {}|{}~", date, minor, dr_cr, record_currency));
    }
    truncate(&out, MINI_STATEMENT_MAX_BYTES)
}

/// Statement dates arrive as dd/MM/yyyy, ISO-8601, or compact digit
/// strings; render as yyyyMMddHHmmss.
fn normalize_statement_date(value: &str) -> String {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%d/%m/%Y") {
        return date.and_hms_opt(0, 0, 0).unwrap().format("%Y%m%d%H%M%S").to_string();
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return dt.format("%Y%m%d%H%M%S").to_string();
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).unwrap().format("%Y%m%d%H%M%S").to_string();
    }
    if value.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y%m%d%H%M%S") {
            return dt.format("%Y%m%d%H%M%S").to_string();
        }
        if let Ok(date) = NaiveDate::parse_from_str(value, "%Y%m%d") {
            return date.and_hms_opt(0, 0, 0).unwrap().format("%Y%m%d%H%M%S").to_string();
        }
        return format!("{:0<14}", value);
    }
    value.to_string()
}

fn value_to_minor(value: &Value) -> String {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let cleaned: String = text.chars().filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-').collect();
    match cleaned.parse::<Decimal>() {
        Ok(amount) => {
            let minor = (amount.abs() * Decimal::from(100))
                .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
            minor.to_string()
        }
        Err(_) => "0".to_string(),
    }
}

fn digits_only(s: &str) -> String {
    let digits: String = s.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        "0".to_string()
    } else {
        digits
    }
}

fn format_minor(value: Decimal) -> String {
    let minor = (value * Decimal::from(100)).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    digits_only(&minor.to_string())
}
