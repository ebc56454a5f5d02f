use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal_macros::dec;

use atm_gateway::charge_engine::ChargeEngine;
use atm_gateway::configure::AppConfig;
use atm_gateway::dictionary::MessageDictionary;
use atm_gateway::esb_client::{EsbClient, EsbService};
use atm_gateway::iso_message::IsoMessage;
use atm_gateway::iso_types::IsoType;
use atm_gateway::models::{EsbRequest, EsbResponse, MiniStatementRecord, TransactionType};
use atm_gateway::processor::Processor;
use atm_gateway::response_assembler::sanitize_numeric_ll_fields;
use atm_gateway::wire_codec::WireCodec;

// Mock ESB
struct MockEsb {
    calls: AtomicUsize,
    response: EsbResponse,
}

impl MockEsb {
    fn returning(response: EsbResponse) -> Arc<Self> {
        Arc::new(Self { calls: AtomicUsize::new(0), response })
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EsbClient for MockEsb {
    async fn post(&self, _transaction_type: TransactionType, _request: &EsbRequest) -> EsbResponse {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.response.clone()
    }
}

fn processor_with(mock: Arc<MockEsb>) -> Processor {
    let cfg = AppConfig::default();
    let service = Arc::new(EsbService::new(mock, ChargeEngine::new(&cfg.esb)));
    Processor::new(MessageDictionary::shared(), service)
}

fn withdrawal_0200() -> IsoMessage {
    let mut m = IsoMessage::new(0x200);
    m.set_text(2, IsoType::Llvar, 13, "4123456789012");
    m.set_text(3, IsoType::Numeric, 6, "010000");
    m.set_text(4, IsoType::Numeric, 12, "000000050000");
    m.set_text(7, IsoType::Date10, 10, "0802123456");
    m.set_text(11, IsoType::Numeric, 6, "000001");
    m.set_text(41, IsoType::Alpha, 8, "ATM00001");
    m.set_text(49, IsoType::Numeric, 3, "800");
    m
}

fn fields_of(msg: &IsoMessage) -> BTreeSet<u8> {
    msg.present_fields().into_iter().collect()
}

#[tokio::test]
async fn test_withdrawal_happy_path() {
    let mock = MockEsb::returning(EsbResponse {
        response_code: Some("00".to_string()),
        authorization_code: Some("AUTH01".to_string()),
        available_balance: Some(dec!(1234.56)),
        ledger_balance: Some(dec!(1234.56)),
        transaction_id: Some("RRN000000001".to_string()),
        ..Default::default()
    });
    let processor = processor_with(mock.clone());

    let request = withdrawal_0200();
    let response = processor.process(&request).await;

    assert_eq!(response.mti(), 0x210);
    assert_eq!(response.string_value(39).as_deref(), Some("00"));
    assert_eq!(response.string_value(38).as_deref(), Some("AUTH01"));
    let balances = response.string_value(54).unwrap();
    assert_eq!(balances.len(), 40);
    assert_eq!(balances, "0001800C0000001234560002800C000000123456");

    // exactly the request's fields plus the mandatory trio
    let mut expected = fields_of(&request);
    expected.extend([38, 39, 54]);
    assert_eq!(fields_of(&response), expected);
    assert_eq!(mock.call_count(), 1);
}

#[tokio::test]
async fn test_request_rrn_echoed_back() {
    let mock = MockEsb::returning(EsbResponse {
        response_code: Some("00".to_string()),
        authorization_code: Some("AUTH01".to_string()),
        transaction_id: Some("RRN-FROM-ESB".to_string()),
        ..Default::default()
    });
    let processor = processor_with(mock);

    let mut request = withdrawal_0200();
    request.set_text(37, IsoType::Alpha, 12, "RRN000000042");
    let response = processor.process(&request).await;

    // the request value takes precedence over the ESB transaction id
    assert_eq!(response.string_value(37).as_deref(), Some("RRN000000042"));
}

#[tokio::test]
async fn test_validation_failure_returns_0231() {
    let mock = MockEsb::returning(EsbResponse::error("00", "unused"));
    let processor = processor_with(mock.clone());

    let mut request = withdrawal_0200();
    request.remove_field(2);
    let response = processor.process(&request).await;

    assert_eq!(response.mti(), 0x231);
    assert_eq!(response.string_value(39).as_deref(), Some("30"));
    let summary = response.string_value(44).unwrap();
    assert!(!summary.is_empty());
    assert!(summary.len() <= 25);
    assert_eq!(mock.call_count(), 0, "validation failures must not reach the ESB");
}

#[tokio::test]
async fn test_limit_exceeded_short_circuits() {
    let mock = MockEsb::returning(EsbResponse::error("00", "unused"));
    let processor = processor_with(mock.clone());

    let mut request = withdrawal_0200();
    request.set_text(4, IsoType::Numeric, 12, "500000000001");
    let response = processor.process(&request).await;

    assert_eq!(response.mti(), 0x210);
    assert_eq!(response.string_value(39).as_deref(), Some("61"));
    let message = response.string_value(44).unwrap();
    assert!(message.starts_with("Transaction amount exceed"));
    assert!(message.len() <= 25);
    assert_eq!(mock.call_count(), 0, "limit gate must not reach the ESB");
}

#[tokio::test]
async fn test_reversal_echoes_exact_field_set() {
    let mock = MockEsb::returning(EsbResponse {
        response_code: Some("00".to_string()),
        authorization_code: Some("AUTH01".to_string()),
        available_balance: Some(dec!(10)),
        ..Default::default()
    });
    let processor = processor_with(mock.clone());

    let mut request = withdrawal_0200();
    request.set_mti(0x420);
    request.set_text(37, IsoType::Alpha, 12, "RRN000000042");
    let response = processor.process(&request).await;

    assert_eq!(response.mti(), 0x430);
    assert_eq!(fields_of(&response), fields_of(&request));
    assert!(!response.has_field(38));
    assert!(!response.has_field(39));
    assert!(!response.has_field(54));
    assert_eq!(mock.call_count(), 1);
}

#[tokio::test]
async fn test_network_management_echo() {
    let mock = MockEsb::returning(EsbResponse::error("00", "unused"));
    let processor = processor_with(mock.clone());

    let mut request = IsoMessage::new(0x800);
    request.set_text(7, IsoType::Date10, 10, "0802123456");
    request.set_text(11, IsoType::Numeric, 6, "000007");
    request.set_text(70, IsoType::Numeric, 3, "001");
    let response = processor.process(&request).await;

    assert_eq!(response.mti(), 0x810);
    assert_eq!(fields_of(&response), fields_of(&request));
    assert_eq!(response.string_value(70).as_deref(), Some("001"));
    assert_eq!(response.string_value(11).as_deref(), Some("000007"));
    assert_eq!(mock.call_count(), 0, "network management never calls the ESB");
}

#[tokio::test]
async fn test_mini_statement_routes_to_field_48() {
    let records: Vec<MiniStatementRecord> = (1..=3)
        .map(|i| MiniStatementRecord {
            date: Some("01/07/2026".to_string()),
            amount: Some(serde_json::Value::String(format!("{}00.00", i))),
            dr_cr: Some("D".to_string()),
            ..Default::default()
        })
        .collect();
    let mock = MockEsb::returning(EsbResponse {
        response_code: Some("00".to_string()),
        authorization_code: Some("AUTH02".to_string()),
        available_balance: Some(dec!(555.00)),
        mini_statement: Some(records),
        ..Default::default()
    });
    let processor = processor_with(mock);

    let mut request = withdrawal_0200();
    request.set_text(3, IsoType::Numeric, 6, "380000");
    let response = processor.process(&request).await;

    assert_eq!(response.mti(), 0x210);
    assert_eq!(response.string_value(39).as_deref(), Some("00"));
    assert!(!response.has_field(62));
    let statement = response.string_value(48).unwrap();
    assert_eq!(statement.matches('~').count(), 3);
    assert!(statement.ends_with('~'));
    for line in statement.trim_end_matches('~').split('~') {
        let parts: Vec<&str> = line.split('|').collect();
        assert_eq!(parts.len(), 4, "bad statement line: {}", line);
        assert_eq!(parts[0].len(), 14);
        assert_eq!(parts[1].len(), 12);
        assert!(parts[2].contains("CSH"));
        assert_eq!(parts[3], "800");
    }

    let mut expected = fields_of(&request);
    expected.extend([38, 39, 48, 54]);
    assert_eq!(fields_of(&response), expected);
}

#[tokio::test]
async fn test_esb_system_error_yields_96() {
    let mock = MockEsb::returning(EsbResponse::error("SYSTEM_ERROR", "connection refused"));
    let processor = processor_with(mock);

    let response = processor.process(&withdrawal_0200()).await;
    assert_eq!(response.mti(), 0x210);
    assert_eq!(response.string_value(39).as_deref(), Some("96"));
    assert!(response.has_field(44));
}

#[tokio::test]
async fn test_business_decline_maps_code() {
    let mock = MockEsb::returning(EsbResponse::error("INSUFFICIENT_FUNDS", "balance too low"));
    let processor = processor_with(mock);

    let request = withdrawal_0200();
    let response = processor.process(&request).await;
    assert_eq!(response.string_value(39).as_deref(), Some("51"));
    // declines still honor the allowed-field discipline
    let mut expected = fields_of(&request);
    expected.extend([38, 39, 54]);
    assert_eq!(fields_of(&response), expected);
}

#[tokio::test]
async fn test_response_round_trips_on_the_wire() {
    let mock = MockEsb::returning(EsbResponse {
        response_code: Some("00".to_string()),
        authorization_code: Some("AUTH01".to_string()),
        available_balance: Some(dec!(1234.56)),
        ledger_balance: Some(dec!(1234.56)),
        ..Default::default()
    });
    let processor = processor_with(mock);

    let codec = WireCodec::new(MessageDictionary::shared());
    let request = withdrawal_0200();
    let request_bytes = codec.encode(&request).unwrap();
    let decoded_request = codec.decode(&request_bytes).unwrap();

    let mut response = processor.process(&decoded_request).await;
    sanitize_numeric_ll_fields(&mut response);
    let bytes = codec.encode(&response).unwrap();
    let framed = WireCodec::frame(&bytes);
    assert_eq!(u16::from_be_bytes([framed[0], framed[1]]) as usize, bytes.len());

    let decoded = codec.decode(&bytes).unwrap();
    assert_eq!(codec.encode(&decoded).unwrap(), bytes);
    assert_eq!(decoded.mti(), 0x210);
    assert_eq!(decoded.string_value(4).as_deref(), Some("000000050000"));
}
