pub mod builder;
pub mod charge_engine;
pub mod configure;
pub mod dictionary;
pub mod errors;
pub mod esb_client;
pub mod iso_message;
pub mod iso_to_json;
pub mod iso_types;
pub mod json_to_iso;
pub mod logging;
pub mod models;
pub mod processor;
pub mod response_assembler;
pub mod tcp_server;
pub mod validator;
pub mod wire_codec;
