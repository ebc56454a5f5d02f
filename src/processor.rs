//! MTI-dispatched transaction orchestration.
//!
//! 0800 echoes locally; 0420/0430 reverse through the ESB without 0200
//! validation; 0200 validates, converts, calls the ESB and assembles the
//! response under the allowed-field policy. Every recoverable failure is
//! answered in-band so the connection stays usable.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::builder::{self, truncate};
use crate::dictionary::MessageDictionary;
use crate::errors::GatewayError;
use crate::esb_client::EsbService;
use crate::iso_message::IsoMessage;
use crate::iso_to_json;
use crate::iso_types::IsoType;
use crate::json_to_iso::{self, normalize_response_code};
use crate::models::EsbRequest;
use crate::response_assembler::assemble;

const MANDATORY_FINANCIAL_FIELDS: [u8; 3] = [38, 39, 54];

pub struct Processor {
    dict: Arc<MessageDictionary>,
    esb: Arc<EsbService>,
}

impl Processor {
    pub fn new(dict: Arc<MessageDictionary>, esb: Arc<EsbService>) -> Self {
        Self { dict, esb }
    }

    pub async fn process(&self, request: &IsoMessage) -> IsoMessage {
        let stan = request.string_value(11).unwrap_or_else(|| "unknown".to_string());
        let mti = request.mti();
        let response_mti = mti + 0x10;

        info!(mti = %request.mti_str(), stan = %stan, fields = ?request.present_fields(), "ISO request received");

        let mut template = builder::response_from_request(&self.dict, request, response_mti);
        template.remove_forbidden_127_subfields();

        // Network management: echo exactly the request's field set
        if mti == 0x800 {
            let allowed: BTreeSet<u8> = request.present_fields().into_iter().collect();
            return assemble(response_mti, &allowed, request, None, &template);
        }

        let is_reversal = mti == 0x420 || mti == 0x430;
        if is_reversal {
            info!(mti = %request.mti_str(), stan = %stan, "reversal received");
        } else if mti == 0x200 {
            let vr = crate::validator::validate_financial(request);
            if !vr.is_valid() {
                let err = GatewayError::ValidationFailed(vr.errors().to_vec());
                warn!(stan = %stan, error = %err, "0200 validation failed");
                return builder::build_0231(&self.dict, request, err.response_code(), &vr.summary());
            }
        } else {
            debug!(mti = %request.mti_str(), "unhandled MTI, continuing on financial path");
        }

        match self.financial_round_trip(request, is_reversal, &template, response_mti).await {
            Ok(response) => response,
            Err(e) => {
                let err = GatewayError::Internal(e.to_string());
                error!(stan = %stan, error = %err, "transaction failed");
                self.error_response(request, err.response_code(), "System error")
            }
        }
    }

    async fn financial_round_trip(
        &self,
        request: &IsoMessage,
        is_reversal: bool,
        template: &IsoMessage,
        response_mti: u16,
    ) -> anyhow::Result<IsoMessage> {
        let json = iso_to_json::convert(request)?;
        debug!(json = %json, "request JSON for ESB");
        let esb_request: EsbRequest = serde_json::from_value(json)?;

        let esb_response = self.esb.send(esb_request).await;
        let original_code = esb_response.response_code.clone().unwrap_or_else(|| "96".to_string());
        let normalized = normalize_response_code(&original_code);
        let message = esb_response.message.clone().unwrap_or_default();

        // Error short-circuits answer with 39 + 44 instead of the full
        // allowed-field assembly
        if original_code.eq_ignore_ascii_case("SYSTEM_ERROR") || normalized == "96" {
            let reason = if message.is_empty() { "System error" } else { message.as_str() };
            let err = GatewayError::EsbUnavailable(reason.to_string());
            warn!(error = %err, "ESB reported failure");
            return Ok(self.error_response(request, err.response_code(), reason));
        }
        if original_code.eq_ignore_ascii_case("EXCEEDS_LIMIT") || original_code.eq_ignore_ascii_case("LIMIT_EXCEEDED")
        {
            let err = GatewayError::LimitExceeded;
            let reason = if message.is_empty() { err.to_string() } else { message.clone() };
            return Ok(self.error_response(request, err.response_code(), &reason));
        }

        let esb_iso = json_to_iso::convert(&self.dict, &esb_response, request);

        let mut allowed: BTreeSet<u8> = request.present_fields().into_iter().collect();
        if !is_reversal {
            allowed.extend(MANDATORY_FINANCIAL_FIELDS);
            if is_mini_statement(request) {
                allowed.insert(48);
            }
        }

        let mut response = assemble(response_mti, &allowed, request, Some(&esb_iso), template);
        self.apply_outcome_rules(&mut response, request, &esb_iso, &allowed, &normalized);
        Ok(response)
    }

    /// Transaction-specific population after assembly: approved responses
    /// carry the auth code, balances and (for mini-statements) the
    /// statement block from the ESB; declines carry the normalized code.
    fn apply_outcome_rules(
        &self,
        response: &mut IsoMessage,
        request: &IsoMessage,
        esb_iso: &IsoMessage,
        allowed: &BTreeSet<u8>,
        code: &str,
    ) {
        let proc_code = request.string_value(3).unwrap_or_default();
        let family = if proc_code.len() >= 2 { &proc_code[..2] } else { proc_code.as_str() };

        if code == "00" {
            let needs_balance = matches!(family, "01" | "21" | "31" | "00" | "02");
            let is_mini_family = family == "38";
            if !needs_balance && !is_mini_family {
                return;
            }
            if allowed.contains(&39) {
                response.set_text(39, IsoType::Alpha, 2, "00");
            }
            for field in [38u8, 54] {
                if allowed.contains(&field) {
                    if let Some(value) = esb_iso.field(field) {
                        response.set_field(field, value.clone());
                    }
                }
            }
            if is_mini_family && allowed.contains(&48) {
                if let Some(value) = esb_iso.field(48) {
                    response.set_field(48, value.clone());
                }
            }
        } else if allowed.contains(&39) && !code.is_empty() {
            response.set_text(39, IsoType::Alpha, 2, truncate(code, 2));
        }
    }

    /// Error response carrying exactly the request's fields plus 39 (and
    /// 44 when there is a message). Validation errors route to 0231.
    pub fn error_response(&self, request: &IsoMessage, code: &str, message: &str) -> IsoMessage {
        if code == "30" {
            return builder::build_0231(&self.dict, request, code, message);
        }
        let response_mti = request.mti() + 0x10;
        let mut source = builder::response_from_request(&self.dict, request, response_mti);
        source.set_text(39, IsoType::Alpha, 2, code);
        let message = truncate(message, 25);
        let mut allowed: BTreeSet<u8> = request.present_fields().into_iter().collect();
        allowed.insert(39);
        if !message.is_empty() {
            let len = message.len();
            source.set_text(44, IsoType::Llvar, len, message);
            allowed.insert(44);
        }
        assemble(response_mti, &allowed, request, Some(&source), &source)
    }
}

fn is_mini_statement(request: &IsoMessage) -> bool {
    request
        .string_value(3)
        .map(|p| {
            let p = p.trim().to_string();
            p.starts_with("32") || p.starts_with("38")
        })
        .unwrap_or(false)
}
