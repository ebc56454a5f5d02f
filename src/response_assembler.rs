//! Builds the outgoing message from an allowed-field set.
//!
//! Source precedence per field: request, then the ESB-converted response,
//! then the dictionary-derived template. A field present in a source but
//! empty is used only when no source has a non-empty value. Nothing
//! outside the allowed set is ever emitted, and nothing is invented when
//! every source lacks the field.

use std::collections::BTreeSet;

use crate::iso_message::{FieldValue, IsoField, IsoMessage};
use crate::iso_types::IsoType;

/// Max digit counts for numeric LL fields sanitized before encoding.
/// Field 35 keeps its Track-2 sentinels and field 70 its network code,
/// so neither is touched.
const NUMERIC_LL_MAX: [(u8, usize); 9] =
    [(2, 19), (32, 11), (33, 11), (99, 11), (100, 11), (101, 17), (102, 28), (103, 28), (104, 999)];

pub fn assemble(
    response_mti: u16,
    allowed: &BTreeSet<u8>,
    request: &IsoMessage,
    esb_response: Option<&IsoMessage>,
    template: &IsoMessage,
) -> IsoMessage {
    let mut response = IsoMessage::new(response_mti);

    for &field in allowed {
        if !(2..=128).contains(&field) {
            continue;
        }
        if field == 127 {
            if let Some(mirrored) = mirror_127(request, esb_response, template) {
                response.set_field(127, mirrored);
            }
            continue;
        }

        let sources = [Some(request), esb_response, Some(template)];
        let mut chosen: Option<&IsoField> = None;
        for source in sources.iter().flatten() {
            if let Some(candidate) = source.field(field) {
                if !candidate.is_empty() {
                    chosen = Some(candidate);
                    break;
                }
                if chosen.is_none() {
                    chosen = Some(candidate);
                }
            }
        }
        let Some(chosen) = chosen else { continue };

        response.set_field(field, with_fallback_type(field, chosen));
    }

    response.remove_forbidden_127_subfields();
    response
}

/// Composite 127 from the first source carrying it, with subfields 22 and
/// 25 stripped. Scalar 127 payloads are mirrored byte-for-byte.
fn mirror_127(
    request: &IsoMessage,
    esb_response: Option<&IsoMessage>,
    template: &IsoMessage,
) -> Option<IsoField> {
    let sources = [Some(request), esb_response, Some(template)];
    let source = sources.iter().flatten().find_map(|m| m.field(127))?;
    let mut mirrored = source.clone();
    if let FieldValue::Composite(nested) = &mut mirrored.value {
        nested.remove_field(22);
        nested.remove_field(25);
    }
    Some(mirrored)
}

/// Preserve the source IsoType and declared length when available;
/// otherwise infer from the fallback table.
fn with_fallback_type(field: u8, source: &IsoField) -> IsoField {
    if source.length > 0 || source.is_empty() {
        return source.clone();
    }
    let rendered = source.render().unwrap_or_default();
    let (iso_type, length) = match field {
        38 | 39 | 11 | 37 => (IsoType::Alpha, rendered.len().min(12)),
        48 | 54 => (IsoType::Lllvar, rendered.len().min(999)),
        _ => (IsoType::Llvar, rendered.len().min(99)),
    };
    IsoField::text(iso_type, length, rendered)
}

/// Numeric-LL sanitation before wire encoding: digits only, capped to the
/// field's maximum.
pub fn sanitize_numeric_ll_fields(msg: &mut IsoMessage) {
    for (field, max_len) in NUMERIC_LL_MAX {
        let Some(existing) = msg.field(field) else { continue };
        let Some(text) = existing.render() else { continue };
        let mut digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            digits = "0".to_string();
        }
        if digits.len() > max_len {
            digits.truncate(max_len);
        }
        let iso_type = existing.iso_type;
        let length = if iso_type.is_variable() { digits.len() } else { existing.length };
        msg.set_text(field, iso_type, length, digits);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> IsoMessage {
        let mut m = IsoMessage::new(0x200);
        m.set_text(2, IsoType::Llvar, 13, "4123456789012");
        m.set_text(3, IsoType::Numeric, 6, "010000");
        m.set_text(4, IsoType::Numeric, 12, "000000050000");
        m.set_text(11, IsoType::Numeric, 6, "000001");
        m.set_text(41, IsoType::Alpha, 8, "ATM00001");
        m.set_text(49, IsoType::Numeric, 3, "800");
        m
    }

    fn esb_response() -> IsoMessage {
        let mut m = IsoMessage::new(0x210);
        m.set_text(38, IsoType::Alpha, 6, "AUTH01");
        m.set_text(39, IsoType::Alpha, 2, "00");
        m.set_text(54, IsoType::Lllvar, 40, "0001800C0000001234560002800C000000123456");
        m.set_text(37, IsoType::Alpha, 12, "RRN000000001");
        m
    }

    fn template() -> IsoMessage {
        let mut m = IsoMessage::new(0x210);
        m.set_text(38, IsoType::Alpha, 6, "      ");
        m.set_text(39, IsoType::Alpha, 2, "00");
        m.set_text(54, IsoType::Lllvar, 0, "");
        m
    }

    fn allowed_of(msg: &IsoMessage, extra: &[u8]) -> BTreeSet<u8> {
        let mut set: BTreeSet<u8> = msg.present_fields().into_iter().collect();
        set.extend(extra.iter().copied());
        set
    }

    #[test]
    fn test_exact_allowed_field_set() {
        let req = request();
        let esb = esb_response();
        let allowed = allowed_of(&req, &[38, 39, 54]);
        let resp = assemble(0x210, &allowed, &req, Some(&esb), &template());
        let present: BTreeSet<u8> = resp.present_fields().into_iter().collect();
        assert_eq!(present, allowed);
        // 37 is in the ESB response but not allowed, so it must not leak
        assert!(!resp.has_field(37));
    }

    #[test]
    fn test_source_precedence_request_first() {
        let mut req = request();
        req.set_text(38, IsoType::Alpha, 6, "REQAUT");
        let allowed = allowed_of(&req, &[39, 54]);
        let resp = assemble(0x210, &allowed, &req, Some(&esb_response()), &template());
        assert_eq!(resp.string_value(38).as_deref(), Some("REQAUT"));
    }

    #[test]
    fn test_esb_wins_over_template() {
        let req = request();
        let allowed = allowed_of(&req, &[38, 39, 54]);
        let resp = assemble(0x210, &allowed, &req, Some(&esb_response()), &template());
        assert_eq!(resp.string_value(38).as_deref(), Some("AUTH01"));
        assert_eq!(resp.string_value(54).unwrap().len(), 40);
    }

    #[test]
    fn test_empty_template_value_used_as_last_resort() {
        let req = request();
        let allowed = allowed_of(&req, &[38, 39, 54]);
        // no ESB response at all: template defaults fill the mandatory fields
        let resp = assemble(0x210, &allowed, &req, None, &template());
        assert_eq!(resp.string_value(38).as_deref(), Some("      "));
        assert!(resp.has_field(54));
        assert!(resp.field(54).unwrap().is_empty());
    }

    #[test]
    fn test_absent_everywhere_is_never_emitted() {
        let req = request();
        let mut allowed = allowed_of(&req, &[]);
        allowed.insert(60);
        let resp = assemble(0x210, &allowed, &req, None, &template());
        assert!(!resp.has_field(60));
    }

    #[test]
    fn test_127_mirrored_with_forbidden_subfields_stripped() {
        let mut nested = IsoMessage::new(0);
        nested.set_text(2, IsoType::Llvar, 4, "9901");
        nested.set_text(22, IsoType::Llvar, 3, "051");
        nested.set_text(25, IsoType::Llvar, 2, "00");
        let mut req = request();
        req.set_field(127, IsoField { iso_type: IsoType::Lllvar, length: 0, value: FieldValue::Composite(nested) });

        let allowed = allowed_of(&req, &[38, 39, 54]);
        let resp = assemble(0x210, &allowed, &req, Some(&esb_response()), &template());
        let mirrored = resp.field(127).unwrap().as_composite().unwrap();
        assert!(mirrored.has_field(2));
        assert!(!mirrored.has_field(22));
        assert!(!mirrored.has_field(25));
    }

    #[test]
    fn test_sanitize_numeric_ll_fields() {
        let mut msg = IsoMessage::new(0x210);
        msg.set_text(2, IsoType::Llvar, 15, "4123-4567-8901A");
        msg.set_text(102, IsoType::Llvar, 12, "01-01234567 ");
        msg.set_text(70, IsoType::Numeric, 3, "001");
        msg.set_text(35, IsoType::Llvar, 20, "4123456789012D250800");
        sanitize_numeric_ll_fields(&mut msg);
        assert_eq!(msg.string_value(2).as_deref(), Some("412345678901"));
        assert_eq!(msg.string_value(102).as_deref(), Some("0101234567"));
        // fields 35 and 70 are untouched
        assert_eq!(msg.string_value(35).as_deref(), Some("4123456789012D250800"));
        assert_eq!(msg.string_value(70).as_deref(), Some("001"));
    }

    #[test]
    fn test_sanitize_caps_to_max_length() {
        let mut msg = IsoMessage::new(0x210);
        msg.set_text(32, IsoType::Llvar, 14, "12345678901234");
        sanitize_numeric_ll_fields(&mut msg);
        assert_eq!(msg.string_value(32).as_deref(), Some("12345678901"));
    }

    #[test]
    fn test_sanitize_keeps_long_to_account_intact() {
        // field 103 is LLVAR(28) in the dictionary; a 20-digit account
        // must survive sanitation unchanged
        let mut msg = IsoMessage::new(0x210);
        msg.set_text(103, IsoType::Llvar, 20, "01234567890123456789");
        sanitize_numeric_ll_fields(&mut msg);
        assert_eq!(msg.string_value(103).as_deref(), Some("01234567890123456789"));
    }
}
