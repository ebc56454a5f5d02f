//! ESB request/response records and the transaction-type vocabulary.
//!
//! The gateway depends only on the JSON shape of these records; every
//! field is optional and absent fields are omitted on the wire.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionType {
    Purchase,
    Withdrawal,
    Deposit,
    Transfer,
    BalanceInquiry,
    MiniStatement,
    Other,
}

impl TransactionType {
    /// Classify by the first two digits of the processing code (field 3).
    pub fn from_processing_code(code: &str) -> Self {
        let family = code.trim();
        let family = if family.len() >= 2 { &family[..2] } else { family };
        match family {
            "00" => Self::Purchase,
            "01" => Self::Withdrawal,
            "02" | "21" => Self::Deposit,
            "03" => Self::Transfer,
            "31" => Self::BalanceInquiry,
            "32" | "38" => Self::MiniStatement,
            _ => Self::Other,
        }
    }

    pub fn from_name(name: &str) -> Self {
        match name.trim().to_uppercase().as_str() {
            "PURCHASE" => Self::Purchase,
            "WITHDRAWAL" => Self::Withdrawal,
            "DEPOSIT" => Self::Deposit,
            "TRANSFER" => Self::Transfer,
            "BALANCE_INQUIRY" => Self::BalanceInquiry,
            "MINI_STATEMENT" => Self::MiniStatement,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Purchase => "PURCHASE",
            Self::Withdrawal => "WITHDRAWAL",
            Self::Deposit => "DEPOSIT",
            Self::Transfer => "TRANSFER",
            Self::BalanceInquiry => "BALANCE_INQUIRY",
            Self::MiniStatement => "MINI_STATEMENT",
            Self::Other => "OTHER",
        }
    }

    /// Charges and commissions only attach to money-moving transactions.
    pub fn is_chargeable(&self) -> bool {
        matches!(self, Self::Deposit | Self::Withdrawal | Self::Purchase)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Charge {
    pub amount: Decimal,
    pub description: String,
    pub to_account: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Commission {
    pub from_account: String,
    pub to_account: String,
    pub amount: Decimal,
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EsbRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_minor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stan: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminal_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transmission_date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rrn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_no: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub charges: Vec<Charge>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commission: Option<Commission>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_date: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub raw_fields: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EsbResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stan: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_minor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_balance: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_balance: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mini_statement: Option<Vec<MiniStatementRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mini_statement_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac_base64: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub raw_fields: BTreeMap<String, String>,
}

impl EsbResponse {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self {
            response_code: Some(code.to_string()),
            message: Some(message.into()),
            ..Default::default()
        }
    }
}

/// One statement line from the core. Upstreams disagree on key names, so
/// the common spellings are accepted as aliases.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MiniStatementRecord {
    #[serde(alias = "transactionDate", alias = "tranDate")]
    pub date: Option<String>,
    #[serde(alias = "description", alias = "narr")]
    pub narration: Option<String>,
    #[serde(alias = "txnAmount", alias = "amt")]
    pub amount: Option<serde_json::Value>,
    #[serde(alias = "runningBalance", alias = "bal")]
    pub balance: Option<serde_json::Value>,
    #[serde(alias = "type")]
    pub dr_cr: Option<String>,
    pub currency: Option<String>,
}
