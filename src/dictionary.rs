//! Per-MTI field dictionary.
//!
//! Financial MTIs (0200/0210/0231/0420/0430) share one full field table;
//! network-management MTIs (0800/0810) use a short one. The composite
//! field 127 carries its own sub-dictionary. The dictionary is immutable
//! after construction and shared behind an `Arc`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::iso_message::IsoMessage;
use crate::iso_types::IsoType;

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub iso_type: IsoType,
    pub length: usize,
}

impl FieldSpec {
    const fn new(iso_type: IsoType, length: usize) -> Self {
        Self { iso_type, length }
    }
}

#[derive(Debug)]
pub struct MessageDictionary {
    templates: HashMap<u16, BTreeMap<u8, FieldSpec>>,
    sub127: BTreeMap<u8, FieldSpec>,
    /// Bitmaps travel as 8 raw bytes when set, 16 hex ASCII chars otherwise.
    pub use_binary_bitmap: bool,
    /// The highest bitmap bit may address a missing trailing field.
    pub ignore_trailing_missing_field: bool,
}

fn financial_table() -> BTreeMap<u8, FieldSpec> {
    use IsoType::*;
    let mut map = BTreeMap::new();
    map.insert(2, FieldSpec::new(Llvar, 19));
    map.insert(3, FieldSpec::new(Numeric, 6));
    map.insert(4, FieldSpec::new(Numeric, 12));
    map.insert(5, FieldSpec::new(Numeric, 12));
    map.insert(6, FieldSpec::new(Numeric, 12));
    map.insert(7, FieldSpec::new(Date10, 10));
    map.insert(8, FieldSpec::new(Numeric, 8));
    map.insert(9, FieldSpec::new(Numeric, 8));
    map.insert(10, FieldSpec::new(Numeric, 8));
    map.insert(11, FieldSpec::new(Numeric, 6));
    map.insert(12, FieldSpec::new(Numeric, 6));
    map.insert(13, FieldSpec::new(Numeric, 4));
    map.insert(14, FieldSpec::new(Numeric, 4));
    map.insert(15, FieldSpec::new(Numeric, 4));
    map.insert(16, FieldSpec::new(Numeric, 4));
    map.insert(17, FieldSpec::new(Numeric, 4));
    map.insert(18, FieldSpec::new(Numeric, 4));
    map.insert(19, FieldSpec::new(Numeric, 3));
    map.insert(20, FieldSpec::new(Numeric, 3));
    map.insert(21, FieldSpec::new(Numeric, 3));
    map.insert(22, FieldSpec::new(Numeric, 3));
    map.insert(23, FieldSpec::new(Numeric, 3));
    map.insert(24, FieldSpec::new(Numeric, 3));
    map.insert(25, FieldSpec::new(Numeric, 2));
    map.insert(26, FieldSpec::new(Numeric, 2));
    map.insert(27, FieldSpec::new(Numeric, 1));
    map.insert(28, FieldSpec::new(Alpha, 9));
    map.insert(29, FieldSpec::new(Alpha, 9));
    map.insert(30, FieldSpec::new(Alpha, 9));
    map.insert(31, FieldSpec::new(Alpha, 9));
    map.insert(32, FieldSpec::new(Llvar, 11));
    map.insert(33, FieldSpec::new(Llvar, 11));
    map.insert(34, FieldSpec::new(Llvar, 28));
    map.insert(35, FieldSpec::new(Llvar, 37));
    map.insert(36, FieldSpec::new(Lllvar, 104));
    map.insert(37, FieldSpec::new(Alpha, 12));
    map.insert(38, FieldSpec::new(Alpha, 6));
    map.insert(39, FieldSpec::new(Alpha, 2));
    map.insert(40, FieldSpec::new(Alpha, 3));
    map.insert(41, FieldSpec::new(Alpha, 8));
    map.insert(42, FieldSpec::new(Alpha, 15));
    map.insert(43, FieldSpec::new(Alpha, 40));
    map.insert(44, FieldSpec::new(Llvar, 25));
    map.insert(45, FieldSpec::new(Llvar, 76));
    map.insert(46, FieldSpec::new(Lllvar, 999));
    map.insert(47, FieldSpec::new(Lllvar, 999));
    map.insert(48, FieldSpec::new(Lllvar, 999));
    map.insert(49, FieldSpec::new(Numeric, 3));
    map.insert(50, FieldSpec::new(Numeric, 3));
    map.insert(51, FieldSpec::new(Numeric, 3));
    map.insert(52, FieldSpec::new(Binary, 8));
    map.insert(53, FieldSpec::new(Binary, 48));
    map.insert(54, FieldSpec::new(Lllvar, 120));
    map.insert(55, FieldSpec::new(Lllbin, 999));
    map.insert(56, FieldSpec::new(Lllvar, 999));
    map.insert(57, FieldSpec::new(Lllvar, 999));
    map.insert(58, FieldSpec::new(Lllvar, 999));
    map.insert(59, FieldSpec::new(Lllvar, 999));
    map.insert(60, FieldSpec::new(Lllvar, 999));
    map.insert(61, FieldSpec::new(Lllvar, 999));
    map.insert(62, FieldSpec::new(Lllvar, 999));
    map.insert(63, FieldSpec::new(Lllvar, 999));
    map.insert(64, FieldSpec::new(Binary, 8));
    map.insert(70, FieldSpec::new(Numeric, 3));
    map.insert(71, FieldSpec::new(Numeric, 4));
    map.insert(72, FieldSpec::new(Numeric, 4));
    map.insert(73, FieldSpec::new(Numeric, 6));
    map.insert(74, FieldSpec::new(Numeric, 10));
    map.insert(75, FieldSpec::new(Numeric, 10));
    map.insert(76, FieldSpec::new(Numeric, 10));
    map.insert(77, FieldSpec::new(Numeric, 10));
    map.insert(78, FieldSpec::new(Numeric, 10));
    map.insert(79, FieldSpec::new(Numeric, 10));
    map.insert(80, FieldSpec::new(Numeric, 10));
    map.insert(81, FieldSpec::new(Numeric, 10));
    map.insert(82, FieldSpec::new(Numeric, 12));
    map.insert(83, FieldSpec::new(Numeric, 12));
    map.insert(84, FieldSpec::new(Numeric, 12));
    map.insert(85, FieldSpec::new(Numeric, 12));
    map.insert(86, FieldSpec::new(Numeric, 16));
    map.insert(87, FieldSpec::new(Numeric, 16));
    map.insert(88, FieldSpec::new(Numeric, 16));
    map.insert(89, FieldSpec::new(Numeric, 16));
    map.insert(90, FieldSpec::new(Llvar, 42));
    map.insert(91, FieldSpec::new(Alpha, 1));
    map.insert(92, FieldSpec::new(Alpha, 2));
    map.insert(93, FieldSpec::new(Alpha, 6));
    map.insert(94, FieldSpec::new(Alpha, 7));
    map.insert(95, FieldSpec::new(Alpha, 42));
    map.insert(96, FieldSpec::new(Binary, 16));
    map.insert(97, FieldSpec::new(Numeric, 17));
    map.insert(98, FieldSpec::new(Alpha, 25));
    map.insert(99, FieldSpec::new(Llvar, 11));
    map.insert(100, FieldSpec::new(Llvar, 11));
    map.insert(101, FieldSpec::new(Llvar, 17));
    map.insert(102, FieldSpec::new(Llvar, 28));
    map.insert(103, FieldSpec::new(Llvar, 28));
    map.insert(104, FieldSpec::new(Lllvar, 999));
    map.insert(120, FieldSpec::new(Lllvar, 999));
    map.insert(121, FieldSpec::new(Lllvar, 999));
    map.insert(122, FieldSpec::new(Lllvar, 999));
    map.insert(123, FieldSpec::new(Lllvar, 999));
    map.insert(124, FieldSpec::new(Lllvar, 999));
    map.insert(125, FieldSpec::new(Lllvar, 999));
    map.insert(126, FieldSpec::new(Lllvar, 999));
    map.insert(127, FieldSpec::new(Lllvar, 999));
    map.insert(128, FieldSpec::new(Binary, 8));
    map
}

fn network_table() -> BTreeMap<u8, FieldSpec> {
    use IsoType::*;
    let mut map = BTreeMap::new();
    map.insert(7, FieldSpec::new(Date10, 10));
    map.insert(11, FieldSpec::new(Numeric, 6));
    map.insert(12, FieldSpec::new(Numeric, 6));
    map.insert(13, FieldSpec::new(Numeric, 4));
    map.insert(39, FieldSpec::new(Alpha, 2));
    map.insert(70, FieldSpec::new(Numeric, 3));
    map
}

// The switch's private-use subfields are all short text; a uniform LLVAR
// table round-trips them byte-exactly.
fn sub127_table() -> BTreeMap<u8, FieldSpec> {
    (1..=128).map(|n| (n, FieldSpec::new(IsoType::Llvar, 99))).collect()
}

impl MessageDictionary {
    pub fn standard() -> Self {
        let financial = financial_table();
        let network = network_table();
        let mut templates = HashMap::new();
        for mti in [0x200u16, 0x210, 0x231, 0x420, 0x430] {
            templates.insert(mti, financial.clone());
        }
        for mti in [0x800u16, 0x810] {
            templates.insert(mti, network.clone());
        }
        Self {
            templates,
            sub127: sub127_table(),
            use_binary_bitmap: true,
            ignore_trailing_missing_field: true,
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::standard())
    }

    pub fn has_mti(&self, mti: u16) -> bool {
        self.templates.contains_key(&mti)
    }

    pub fn spec(&self, mti: u16, field: u8) -> Option<&FieldSpec> {
        self.templates.get(&mti).and_then(|t| t.get(&field))
    }

    pub fn sub127_spec(&self, subfield: u8) -> Option<&FieldSpec> {
        self.sub127.get(&subfield)
    }

    /// Dictionary defaults used as the last-resort source when assembling a
    /// response: an approval-code placeholder, an approved response code and
    /// an empty additional-amounts block.
    pub fn response_template(&self, mti: u16) -> IsoMessage {
        let mut template = IsoMessage::new(mti);
        if let Some(spec) = self.spec(mti, 38) {
            template.set_text(38, spec.iso_type, spec.length, "      ");
        }
        if let Some(spec) = self.spec(mti, 39) {
            template.set_text(39, spec.iso_type, spec.length, "00");
        }
        if let Some(spec) = self.spec(mti, 54) {
            template.set_text(54, spec.iso_type, 0, "");
        }
        template
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates_cover_all_mtis() {
        let dict = MessageDictionary::standard();
        for mti in [0x200u16, 0x210, 0x231, 0x420, 0x430, 0x800, 0x810] {
            assert!(dict.has_mti(mti), "missing template for {:04X}", mti);
        }
        assert!(!dict.has_mti(0x100));
    }

    #[test]
    fn test_financial_field_specs() {
        let dict = MessageDictionary::standard();
        let pan = dict.spec(0x200, 2).unwrap();
        assert_eq!(pan.iso_type, IsoType::Llvar);
        assert_eq!(pan.length, 19);
        assert_eq!(dict.spec(0x200, 4).unwrap().length, 12);
        assert_eq!(dict.spec(0x200, 64).unwrap().iso_type, IsoType::Binary);
        assert_eq!(dict.spec(0x210, 54).unwrap().iso_type, IsoType::Lllvar);
    }

    #[test]
    fn test_network_table_is_short() {
        let dict = MessageDictionary::standard();
        assert!(dict.spec(0x800, 70).is_some());
        assert!(dict.spec(0x800, 2).is_none());
        assert!(dict.spec(0x810, 39).is_some());
    }

    #[test]
    fn test_response_template_defaults() {
        let dict = MessageDictionary::standard();
        let t = dict.response_template(0x210);
        assert_eq!(t.string_value(38).as_deref(), Some("      "));
        assert_eq!(t.string_value(39).as_deref(), Some("00"));
        assert!(t.has_field(54));
        // network template only has 39
        let n = dict.response_template(0x810);
        assert!(!n.has_field(38));
        assert_eq!(n.string_value(39).as_deref(), Some("00"));
    }

    #[test]
    fn test_sub127_dictionary() {
        let dict = MessageDictionary::standard();
        assert_eq!(dict.sub127_spec(22).unwrap().iso_type, IsoType::Llvar);
        assert!(dict.sub127_spec(128).is_some());
    }
}
