//! Response skeletons derived from the inbound request.

use rust_decimal::Decimal;

use crate::dictionary::MessageDictionary;
use crate::iso_message::IsoMessage;
use crate::iso_types::IsoType;

/// Fields never copied forward from a request into a response skeleton;
/// they are outcome fields owned by the response side.
const RESPONSE_OWNED: [u8; 4] = [38, 39, 44, 54];

/// Dictionary template defaults plus every request field 2..=64 that is
/// not response-owned. The assembler uses this as its last-resort source.
/// Field 54 defaults to a zero-balance block so it always carries the
/// full 40-char layout even when the core returns no balances.
pub fn response_from_request(dict: &MessageDictionary, request: &IsoMessage, response_mti: u16) -> IsoMessage {
    let mut response = dict.response_template(response_mti);
    response.set_mti(response_mti);
    for number in 2u8..=64 {
        if RESPONSE_OWNED.contains(&number) {
            continue;
        }
        if let Some(field) = request.field(number) {
            response.set_field(number, field.clone());
        }
    }
    if response.has_field(54) {
        let currency = request
            .string_value(49)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| "800".to_string());
        let zero_block =
            crate::json_to_iso::additional_amounts(Some(Decimal::ZERO), Some(Decimal::ZERO), &currency);
        let len = zero_block.len();
        response.set_text(54, IsoType::Lllvar, len, zero_block);
    }
    response
}

/// Validation-failure response: 0231 with the error code in 39 and a
/// truncated summary in 44. No approval code is ever present.
pub fn build_0231(dict: &MessageDictionary, request: &IsoMessage, code: &str, message: &str) -> IsoMessage {
    let mut response = response_from_request(dict, request, 0x231);
    response.set_text(39, IsoType::Alpha, 2, code);
    let truncated = truncate(message, 25);
    if !truncated.is_empty() {
        let len = truncated.len();
        response.set_text(44, IsoType::Llvar, len, truncated);
    }
    response.remove_field(38);
    response
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.len() > max {
        let mut end = max;
        while end > 0 && !s.is_char_boundary(end) {
            end -= 1;
        }
        s[..end].to_string()
    } else {
        s.to_string()
    }
}
