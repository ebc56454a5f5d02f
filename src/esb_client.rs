//! ESB transport and the gateway service that prepares each call.
//!
//! `EsbClient` is the HTTP seam; tests substitute their own
//! implementation. Transport failures never surface as errors — they
//! come back as a SYSTEM_ERROR response body so the processor can answer
//! the ATM in-band.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Local, Months, Utc};
use rand::Rng;
use reqwest::Client;
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::{info, warn};

use crate::charge_engine::ChargeEngine;
use crate::configure::EsbConfig;
use crate::models::{EsbRequest, EsbResponse, TransactionType};

const ESB_CALL_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
pub trait EsbClient: Send + Sync {
    async fn post(&self, transaction_type: TransactionType, request: &EsbRequest) -> EsbResponse;
}

pub struct HttpEsbClient {
    client: Client,
    cfg: EsbConfig,
}

impl HttpEsbClient {
    pub fn new(cfg: EsbConfig) -> Self {
        Self { client: Client::new(), cfg }
    }

    fn route(&self, transaction_type: TransactionType) -> Option<String> {
        let path = match transaction_type {
            TransactionType::Withdrawal => &self.cfg.withdrawal,
            TransactionType::Deposit => &self.cfg.deposit,
            TransactionType::Purchase => &self.cfg.purchase,
            TransactionType::BalanceInquiry => &self.cfg.balance_inquiry,
            TransactionType::MiniStatement => &self.cfg.mini_statement,
            // no dedicated endpoint; surfaced as a 96 decline
            TransactionType::Transfer | TransactionType::Other => return None,
        };
        Some(format!("{}{}", self.cfg.base_url.trim_end_matches('/'), path))
    }
}

#[async_trait]
impl EsbClient for HttpEsbClient {
    async fn post(&self, transaction_type: TransactionType, request: &EsbRequest) -> EsbResponse {
        let Some(url) = self.route(transaction_type) else {
            warn!(transaction_type = transaction_type.as_str(), "no ESB route configured");
            return EsbResponse::error("96", format!("No ESB route for {}", transaction_type.as_str()));
        };

        let result = self
            .client
            .post(&url)
            .basic_auth(&self.cfg.username, Some(&self.cfg.password))
            .json(request)
            .timeout(ESB_CALL_TIMEOUT)
            .send()
            .await;

        let response = match result {
            Ok(r) => r,
            Err(e) => {
                warn!(url = %url, error = %e, "ESB call failed");
                return EsbResponse::error("SYSTEM_ERROR", e.to_string());
            }
        };

        let status = response.status();
        let reason = status.canonical_reason().unwrap_or("").to_string();
        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => return EsbResponse::error("SYSTEM_ERROR", e.to_string()),
        };

        if status.is_success() {
            if body.trim().is_empty() {
                return EsbResponse::error("00", reason);
            }
            match serde_json::from_str::<EsbResponse>(&body) {
                Ok(decoded) => decoded,
                Err(e) => {
                    warn!(error = %e, "undecodable ESB response body");
                    EsbResponse::error("SYSTEM_ERROR", e.to_string())
                }
            }
        } else if status.is_redirection() {
            EsbResponse::error("51", reason)
        } else if status.is_client_error() {
            EsbResponse::error("14", reason)
        } else {
            EsbResponse::error("96", reason)
        }
    }
}

/// Prepares each outbound call: limit gate, external reference, charges,
/// commission, statement date range, account routing.
pub struct EsbService {
    client: Arc<dyn EsbClient>,
    charges: ChargeEngine,
}

impl EsbService {
    pub fn new(client: Arc<dyn EsbClient>, charges: ChargeEngine) -> Self {
        Self { client, charges }
    }

    pub async fn send(&self, mut request: EsbRequest) -> EsbResponse {
        let transaction_type = TransactionType::from_name(request.transaction_type.as_deref().unwrap_or(""));

        if self.charges.exceeds_limit(&request) {
            info!(
                amount = ?request.amount,
                "transaction amount exceeds limit, short-circuiting ESB call"
            );
            return EsbResponse::error("EXCEEDS_LIMIT", "Transaction amount exceeds allowed limit");
        }

        let external_ref = generate_external_reference();
        request.external_ref = Some(external_ref.clone());
        request.charges = self.charges.build_charges(transaction_type, &request);

        if transaction_type == TransactionType::Deposit {
            request.commission = Some(self.charges.commission_for(&external_ref));
        }

        if transaction_type == TransactionType::MiniStatement {
            let (from_date, to_date) = mini_statement_range();
            request.from_date = Some(from_date);
            request.to_date = Some(to_date);
        }

        if matches!(transaction_type, TransactionType::MiniStatement | TransactionType::BalanceInquiry) {
            request.account_number = request.from_account.clone().or_else(|| request.to_account.clone());
        }

        if transaction_type.is_chargeable() {
            let (from, target) = self.charges.source_destination(
                transaction_type,
                request.from_account.clone(),
                request.to_account.clone(),
            );
            request.from_account = from;
            request.target_account = target;
        }

        let mut response = self.client.post(transaction_type, &request).await;

        if response.amount_minor.is_none() {
            if let Some(amount) = response.amount {
                let minor = (amount * Decimal::from(100))
                    .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
                response.amount_minor = Some(minor.to_string());
            }
        }

        response
    }
}

/// `"Ref " + yyyyMMddHHmmssSSS + 5 uppercase letters + 5 digits`
pub fn generate_external_reference() -> String {
    let mut rng = rand::thread_rng();
    let timestamp = Utc::now().format("%Y%m%d%H%M%S%3f");
    let letters: String = (0..5).map(|_| rng.gen_range(b'A'..=b'Z') as char).collect();
    let digits: u32 = rng.gen_range(0..100_000);
    format!("Ref {}{}{:05}", timestamp, letters, digits)
}

/// `[today - 3 months, today]`, both dd/MM/yyyy.
pub fn mini_statement_range() -> (String, String) {
    let to_date = Local::now().date_naive();
    let from_date = to_date.checked_sub_months(Months::new(3)).unwrap_or(to_date);
    (from_date.format("%d/%m/%Y").to_string(), to_date.format("%d/%m/%Y").to_string())
}
