//! In-memory ISO-8583 message model.
//!
//! A message is an MTI plus a sparse map from field number (2..=128) to a
//! typed value. Field 0 is the MTI and never appears in the map; field 1 is
//! the secondary-bitmap indicator and is derived at pack time. Composite
//! field 127 nests a further IsoMessage parsed under its sub-dictionary.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::iso_types::IsoType;

/// Subfields never allowed on an outbound composite 127.
pub const FORBIDDEN_127_SUBFIELDS: [u8; 2] = [22, 25];

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Bytes(Vec<u8>),
    Composite(IsoMessage),
}

#[derive(Debug, Clone, PartialEq)]
pub struct IsoField {
    pub iso_type: IsoType,
    pub length: usize,
    pub value: FieldValue,
}

impl IsoField {
    pub fn text(iso_type: IsoType, length: usize, value: impl Into<String>) -> Self {
        Self { iso_type, length, value: FieldValue::Text(value.into()) }
    }

    pub fn bytes(iso_type: IsoType, length: usize, value: Vec<u8>) -> Self {
        Self { iso_type, length, value: FieldValue::Bytes(value) }
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.value {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.value {
            FieldValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_composite(&self) -> Option<&IsoMessage> {
        match &self.value {
            FieldValue::Composite(m) => Some(m),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match &self.value {
            FieldValue::Text(s) => s.trim().is_empty(),
            FieldValue::Bytes(b) => b.is_empty(),
            FieldValue::Composite(m) => m.fields.is_empty(),
        }
    }

    /// String rendering used for JSON and logging: binary values render as
    /// base64, composites are not flattened here.
    pub fn render(&self) -> Option<String> {
        match &self.value {
            FieldValue::Text(s) => Some(s.clone()),
            FieldValue::Bytes(b) => Some(BASE64.encode(b)),
            FieldValue::Composite(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct IsoMessage {
    mti: u16,
    fields: BTreeMap<u8, IsoField>,
}

impl IsoMessage {
    pub fn new(mti: u16) -> Self {
        Self { mti, fields: BTreeMap::new() }
    }

    pub fn mti(&self) -> u16 {
        self.mti
    }

    pub fn set_mti(&mut self, mti: u16) {
        self.mti = mti;
    }

    /// MTI rendered the way it travels on the wire, e.g. 0x210 -> "0210".
    pub fn mti_str(&self) -> String {
        format!("{:04X}", self.mti)
    }

    pub fn has_field(&self, number: u8) -> bool {
        self.fields.contains_key(&number)
    }

    pub fn field(&self, number: u8) -> Option<&IsoField> {
        self.fields.get(&number)
    }

    pub fn field_mut(&mut self, number: u8) -> Option<&mut IsoField> {
        self.fields.get_mut(&number)
    }

    pub fn set_field(&mut self, number: u8, field: IsoField) {
        self.fields.insert(number, field);
    }

    pub fn set_text(&mut self, number: u8, iso_type: IsoType, length: usize, value: impl Into<String>) {
        self.set_field(number, IsoField::text(iso_type, length, value));
    }

    pub fn set_bytes(&mut self, number: u8, iso_type: IsoType, value: Vec<u8>) {
        let length = value.len();
        self.set_field(number, IsoField::bytes(iso_type, length, value));
    }

    pub fn remove_field(&mut self, number: u8) -> Option<IsoField> {
        self.fields.remove(&number)
    }

    /// Field numbers present, ascending.
    pub fn present_fields(&self) -> Vec<u8> {
        self.fields.keys().copied().collect()
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, &IsoField)> {
        self.fields.iter().map(|(n, f)| (*n, f))
    }

    /// String value of a field; binary renders base64, composite yields None.
    pub fn string_value(&self, number: u8) -> Option<String> {
        self.field(number).and_then(|f| f.render())
    }

    /// Strip subfields 22 and 25 from a composite field 127. Safe to call
    /// repeatedly and when 127 is absent or not composite.
    pub fn remove_forbidden_127_subfields(&mut self) {
        if let Some(field) = self.fields.get_mut(&127) {
            if let FieldValue::Composite(nested) = &mut field.value {
                for sub in FORBIDDEN_127_SUBFIELDS {
                    nested.remove_field(sub);
                }
            }
        }
    }
}
