//! ISO-8583 wire codec.
//!
//! Frame layout: 2-byte big-endian payload length, then payload. Payload
//! layout: 4 ASCII MTI chars, primary bitmap, optional secondary bitmap
//! (bit 1), then field data in ascending field order. Bitmaps are 8 raw
//! bytes in binary mode, 16 hex ASCII chars otherwise. Text is UTF-8.
//!
//! Decoding preserves fixed-field padding and variable-field bytes exactly,
//! so decode/encode round-trips are byte-identical.

use std::sync::Arc;

use crate::dictionary::MessageDictionary;
use crate::errors::GatewayError;
use crate::iso_message::{FieldValue, IsoField, IsoMessage};
use crate::iso_types::IsoType;

pub struct WireCodec {
    dict: Arc<MessageDictionary>,
}

impl WireCodec {
    pub fn new(dict: Arc<MessageDictionary>) -> Self {
        Self { dict }
    }

    pub fn dictionary(&self) -> &Arc<MessageDictionary> {
        &self.dict
    }

    /// Prepend the 2-byte big-endian length prefix.
    pub fn frame(payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(payload.len() + 2);
        out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    pub fn decode(&self, payload: &[u8]) -> Result<IsoMessage, GatewayError> {
        let mut cursor = Cursor { data: payload, pos: 0 };

        let mti_bytes = cursor.take(4).ok_or_else(|| malformed("payload too short for MTI"))?;
        let mti_str = std::str::from_utf8(mti_bytes).map_err(|_| malformed("MTI is not ASCII"))?;
        let mti = u16::from_str_radix(mti_str, 16).map_err(|_| malformed("MTI is not numeric"))?;
        if !self.dict.has_mti(mti) {
            return Err(malformed(&format!("no dictionary template for MTI {}", mti_str)));
        }

        let bitmap = self.read_bitmap(&mut cursor)?;
        let present = present_fields(&bitmap);

        let mut msg = IsoMessage::new(mti);
        for (idx, &field) in present.iter().enumerate() {
            let spec = self
                .dict
                .spec(mti, field)
                .ok_or_else(|| malformed(&format!("bitmap addresses field {} with no dictionary entry", field)))?;

            let last = idx == present.len() - 1;
            if cursor.remaining() == 0 && last && self.dict.ignore_trailing_missing_field {
                break;
            }

            let value = self.read_field(&mut cursor, field, spec.iso_type, spec.length)?;
            msg.set_field(field, value);
        }

        Ok(msg)
    }

    pub fn encode(&self, msg: &IsoMessage) -> Result<Vec<u8>, GatewayError> {
        let mut out = Vec::with_capacity(256);
        out.extend_from_slice(msg.mti_str().as_bytes());

        let fields = msg.present_fields();
        let mut bitmap = [0u8; 16];
        let secondary = fields.iter().any(|&f| f > 64);
        if secondary {
            set_bit(&mut bitmap, 1);
        }
        for &f in &fields {
            set_bit(&mut bitmap, f);
        }
        let bitmap_len = if secondary { 16 } else { 8 };
        if self.dict.use_binary_bitmap {
            out.extend_from_slice(&bitmap[..bitmap_len]);
        } else {
            for b in &bitmap[..bitmap_len] {
                out.extend_from_slice(format!("{:02X}", b).as_bytes());
            }
        }

        for &f in &fields {
            let field = msg.field(f).expect("present field");
            self.write_field(&mut out, f, field)?;
        }
        Ok(out)
    }

    fn read_bitmap(&self, cursor: &mut Cursor) -> Result<[u8; 16], GatewayError> {
        let mut bitmap = [0u8; 16];
        if self.dict.use_binary_bitmap {
            let primary = cursor.take(8).ok_or_else(|| malformed("payload too short for bitmap"))?;
            bitmap[..8].copy_from_slice(primary);
            if bitmap[0] & 0x80 != 0 {
                let sec = cursor.take(8).ok_or_else(|| malformed("payload too short for secondary bitmap"))?;
                bitmap[8..].copy_from_slice(sec);
            }
        } else {
            let primary = cursor.take(16).ok_or_else(|| malformed("payload too short for bitmap"))?;
            decode_hex_bitmap(primary, &mut bitmap[..8])?;
            if bitmap[0] & 0x80 != 0 {
                let sec = cursor.take(16).ok_or_else(|| malformed("payload too short for secondary bitmap"))?;
                decode_hex_bitmap(sec, &mut bitmap[8..])?;
            }
        }
        Ok(bitmap)
    }

    fn read_field(
        &self,
        cursor: &mut Cursor,
        field: u8,
        iso_type: IsoType,
        declared: usize,
    ) -> Result<IsoField, GatewayError> {
        if iso_type.is_variable() {
            let prefix = iso_type.prefix_digits();
            let raw = cursor
                .take(prefix)
                .ok_or_else(|| malformed(&format!("field {}: truncated length prefix", field)))?;
            let len_str =
                std::str::from_utf8(raw).map_err(|_| malformed(&format!("field {}: non-ASCII length prefix", field)))?;
            let len: usize = len_str
                .parse()
                .map_err(|_| malformed(&format!("field {}: invalid length prefix '{}'", field, len_str)))?;
            let data = cursor
                .take(len)
                .ok_or_else(|| malformed(&format!("field {}: value shorter than declared length {}", field, len)))?;

            if field == 127 {
                let nested = self.decode_composite(data)?;
                return Ok(IsoField { iso_type, length: len, value: FieldValue::Composite(nested) });
            }
            if iso_type.is_binary() {
                return Ok(IsoField::bytes(iso_type, len, data.to_vec()));
            }
            let text = String::from_utf8(data.to_vec())
                .map_err(|_| malformed(&format!("field {}: invalid UTF-8", field)))?;
            Ok(IsoField::text(iso_type, len, text))
        } else {
            let data = cursor
                .take(declared)
                .ok_or_else(|| malformed(&format!("field {}: value shorter than fixed length {}", field, declared)))?;
            if iso_type.is_binary() {
                return Ok(IsoField::bytes(iso_type, declared, data.to_vec()));
            }
            let text = String::from_utf8(data.to_vec())
                .map_err(|_| malformed(&format!("field {}: invalid UTF-8", field)))?;
            Ok(IsoField::text(iso_type, declared, text))
        }
    }

    fn write_field(&self, out: &mut Vec<u8>, number: u8, field: &IsoField) -> Result<(), GatewayError> {
        let iso_type = field.iso_type;
        if iso_type.is_variable() {
            let data: Vec<u8> = match &field.value {
                FieldValue::Composite(nested) => self.encode_composite(nested)?,
                FieldValue::Bytes(b) => b.clone(),
                FieldValue::Text(s) => s.as_bytes().to_vec(),
            };
            let cap = iso_type.max_length();
            let data = if data.len() > cap { truncate_bytes(&data, cap) } else { data };
            let prefix = iso_type.prefix_digits();
            out.extend_from_slice(format!("{:0width$}", data.len(), width = prefix).as_bytes());
            out.extend_from_slice(&data);
            Ok(())
        } else if iso_type.is_binary() {
            let mut data = match &field.value {
                FieldValue::Bytes(b) => b.clone(),
                FieldValue::Text(s) => s.as_bytes().to_vec(),
                FieldValue::Composite(_) => {
                    return Err(malformed(&format!("field {}: composite value in fixed binary field", number)))
                }
            };
            if field.length > 0 {
                data.resize(field.length, 0);
            }
            out.extend_from_slice(&data);
            Ok(())
        } else {
            let text = match &field.value {
                FieldValue::Text(s) => s.clone(),
                FieldValue::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
                FieldValue::Composite(_) => {
                    return Err(malformed(&format!("field {}: composite value in fixed text field", number)))
                }
            };
            out.extend_from_slice(iso_type.pad(&text, field.length).as_bytes());
            Ok(())
        }
    }

    /// Parse a 127 payload as a nested message: own bitmap, no MTI,
    /// subfields under the 127 sub-dictionary.
    fn decode_composite(&self, data: &[u8]) -> Result<IsoMessage, GatewayError> {
        let mut nested = IsoMessage::new(0);
        if data.is_empty() {
            return Ok(nested);
        }
        let mut cursor = Cursor { data, pos: 0 };
        let bitmap = self.read_bitmap(&mut cursor)?;
        let present = present_fields(&bitmap);
        for (idx, &sub) in present.iter().enumerate() {
            let spec = self
                .dict
                .sub127_spec(sub)
                .ok_or_else(|| malformed(&format!("127.{}: no sub-dictionary entry", sub)))?;
            let last = idx == present.len() - 1;
            if cursor.remaining() == 0 && last && self.dict.ignore_trailing_missing_field {
                break;
            }
            let value = self.read_field(&mut cursor, sub, spec.iso_type, spec.length)?;
            nested.set_field(sub, value);
        }
        Ok(nested)
    }

    fn encode_composite(&self, nested: &IsoMessage) -> Result<Vec<u8>, GatewayError> {
        let fields = nested.present_fields();
        let mut out = Vec::with_capacity(64);
        let mut bitmap = [0u8; 16];
        let secondary = fields.iter().any(|&f| f > 64);
        if secondary {
            set_bit(&mut bitmap, 1);
        }
        for &f in &fields {
            set_bit(&mut bitmap, f);
        }
        let bitmap_len = if secondary { 16 } else { 8 };
        if self.dict.use_binary_bitmap {
            out.extend_from_slice(&bitmap[..bitmap_len]);
        } else {
            for b in &bitmap[..bitmap_len] {
                out.extend_from_slice(format!("{:02X}", b).as_bytes());
            }
        }
        for &f in &fields {
            let field = nested.field(f).expect("present subfield");
            self.write_field(&mut out, f, field)?;
        }
        Ok(out)
    }
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.pos + n > self.data.len() {
            return None;
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Some(slice)
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

/// Data fields addressed by the bitmap, ascending. Bit 1 is the secondary
/// bitmap indicator, never a data field.
fn present_fields(bitmap: &[u8; 16]) -> Vec<u8> {
    let mut fields = Vec::new();
    for n in 2u8..=128 {
        let byte = (n as usize - 1) / 8;
        let mask = 0x80 >> ((n as usize - 1) % 8);
        if bitmap[byte] & mask != 0 {
            fields.push(n);
        }
    }
    fields
}

fn set_bit(bitmap: &mut [u8; 16], field: u8) {
    let byte = (field as usize - 1) / 8;
    let mask = 0x80 >> ((field as usize - 1) % 8);
    bitmap[byte] |= mask;
}

fn decode_hex_bitmap(chars: &[u8], out: &mut [u8]) -> Result<(), GatewayError> {
    let text = std::str::from_utf8(chars).map_err(|_| malformed("bitmap is not hex ASCII"))?;
    for (i, chunk) in text.as_bytes().chunks(2).enumerate() {
        let pair = std::str::from_utf8(chunk).expect("already validated");
        out[i] = u8::from_str_radix(pair, 16).map_err(|_| malformed("bitmap is not hex ASCII"))?;
    }
    Ok(())
}

fn truncate_bytes(data: &[u8], mut cap: usize) -> Vec<u8> {
    // back off to a char boundary so UTF-8 text stays valid
    while cap > 0 && std::str::from_utf8(&data[..cap]).is_err() {
        cap -= 1;
    }
    data[..cap].to_vec()
}

fn malformed(msg: &str) -> GatewayError {
    GatewayError::FrameMalformed(msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> WireCodec {
        WireCodec::new(MessageDictionary::shared())
    }

    fn sample_0200() -> IsoMessage {
        let mut msg = IsoMessage::new(0x200);
        msg.set_text(2, IsoType::Llvar, 13, "4123456789012");
        msg.set_text(3, IsoType::Numeric, 6, "010000");
        msg.set_text(4, IsoType::Numeric, 12, "000000050000");
        msg.set_text(7, IsoType::Date10, 10, "0802123456");
        msg.set_text(11, IsoType::Numeric, 6, "000001");
        msg.set_text(41, IsoType::Alpha, 8, "ATM00001");
        msg.set_text(49, IsoType::Numeric, 3, "800");
        msg
    }

    #[test]
    fn test_round_trip_primary_bitmap_only() {
        let codec = codec();
        let msg = sample_0200();
        let bytes = codec.encode(&msg).unwrap();
        let decoded = codec.decode(&bytes).unwrap();
        assert_eq!(decoded.mti(), 0x200);
        assert_eq!(decoded.string_value(2).as_deref(), Some("4123456789012"));
        assert_eq!(decoded.string_value(4).as_deref(), Some("000000050000"));
        assert_eq!(decoded.string_value(41).as_deref(), Some("ATM00001"));
        let re_encoded = codec.encode(&decoded).unwrap();
        assert_eq!(bytes, re_encoded);
    }

    #[test]
    fn test_secondary_bitmap_round_trip() {
        let codec = codec();
        let mut msg = sample_0200();
        msg.set_text(102, IsoType::Llvar, 10, "0101234567");
        let bytes = codec.encode(&msg).unwrap();
        // secondary bitmap indicator set
        assert_eq!(bytes[4] & 0x80, 0x80);
        let decoded = codec.decode(&bytes).unwrap();
        assert_eq!(decoded.string_value(102).as_deref(), Some("0101234567"));
        assert_eq!(codec.encode(&decoded).unwrap(), bytes);
    }

    #[test]
    fn test_binary_field_round_trip() {
        let codec = codec();
        let mut msg = sample_0200();
        let mac = vec![0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01, 0x02, 0x03];
        msg.set_bytes(64, IsoType::Binary, mac.clone());
        let bytes = codec.encode(&msg).unwrap();
        let decoded = codec.decode(&bytes).unwrap();
        assert_eq!(decoded.field(64).unwrap().as_bytes(), Some(mac.as_slice()));
    }

    #[test]
    fn test_composite_127_round_trip() {
        let codec = codec();
        let mut nested = IsoMessage::new(0);
        nested.set_text(2, IsoType::Llvar, 4, "9901");
        nested.set_text(20, IsoType::Llvar, 3, "UGX");
        let mut msg = sample_0200();
        msg.set_field(127, IsoField { iso_type: IsoType::Lllvar, length: 0, value: FieldValue::Composite(nested) });

        let bytes = codec.encode(&msg).unwrap();
        let decoded = codec.decode(&bytes).unwrap();
        let sub = decoded.field(127).unwrap().as_composite().unwrap();
        assert_eq!(sub.string_value(2).as_deref(), Some("9901"));
        assert_eq!(sub.string_value(20).as_deref(), Some("UGX"));
        assert_eq!(codec.encode(&decoded).unwrap(), bytes);
    }

    #[test]
    fn test_unknown_mti_is_malformed() {
        let codec = codec();
        let mut payload = b"0100".to_vec();
        payload.extend_from_slice(&[0u8; 8]);
        let err = codec.decode(&payload).unwrap_err();
        assert!(matches!(err, GatewayError::FrameMalformed(_)));
    }

    #[test]
    fn test_bitmap_bit_without_dictionary_entry() {
        let codec = codec();
        // 0800 template has no field 2; set its bit anyway
        let mut payload = b"0800".to_vec();
        let mut bitmap = [0u8; 16];
        set_bit(&mut bitmap, 2);
        set_bit(&mut bitmap, 70);
        payload.extend_from_slice(&bitmap[..8]);
        payload.extend_from_slice(b"001");
        let err = codec.decode(&payload).unwrap_err();
        assert!(matches!(err, GatewayError::FrameMalformed(_)));
    }

    #[test]
    fn test_ignore_trailing_missing_field() {
        let codec = codec();
        // 0800 with bits 70 and 11 set but only field 11 present; field 70
        // sits at message end and may be absent
        let mut payload = b"0800".to_vec();
        let mut bitmap = [0u8; 16];
        set_bit(&mut bitmap, 11);
        set_bit(&mut bitmap, 70);
        payload.extend_from_slice(&bitmap[..8]);
        payload.extend_from_slice(b"000001");
        let decoded = codec.decode(&payload).unwrap();
        assert!(decoded.has_field(11));
        assert!(!decoded.has_field(70));
    }

    #[test]
    fn test_truncated_variable_field() {
        let codec = codec();
        let mut payload = b"0200".to_vec();
        let mut bitmap = [0u8; 16];
        set_bit(&mut bitmap, 2);
        set_bit(&mut bitmap, 3);
        payload.extend_from_slice(&bitmap[..8]);
        payload.extend_from_slice(b"13412345"); // declares 13, supplies 6
        let err = codec.decode(&payload).unwrap_err();
        assert!(matches!(err, GatewayError::FrameMalformed(_)));
    }

    #[test]
    fn test_frame_prefix() {
        let framed = WireCodec::frame(b"0800");
        assert_eq!(framed, vec![0x00, 0x04, b'0', b'8', b'0', b'0']);
    }
}
