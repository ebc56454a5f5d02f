use std::sync::Arc;

use tracing::{error, info};

use atm_gateway::charge_engine::ChargeEngine;
use atm_gateway::configure;
use atm_gateway::dictionary::MessageDictionary;
use atm_gateway::esb_client::{EsbService, HttpEsbClient};
use atm_gateway::logging;
use atm_gateway::processor::Processor;
use atm_gateway::tcp_server::TcpServer;
use atm_gateway::wire_codec::WireCodec;

#[tokio::main]
async fn main() {
    let config = match configure::load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };
    if config.server.port == 0 {
        eprintln!("Invalid ATM server port: {}", config.server.port);
        std::process::exit(1);
    }

    let _guard = logging::init_logging("atm-gateway", "logs");

    let dict = MessageDictionary::shared();
    let codec = Arc::new(WireCodec::new(dict.clone()));
    let charge_engine = ChargeEngine::new(&config.esb);
    let esb_client = Arc::new(HttpEsbClient::new(config.esb.clone()));
    let esb_service = Arc::new(EsbService::new(esb_client, charge_engine));
    let processor = Arc::new(Processor::new(dict, esb_service));
    let server = TcpServer::new(config.server.clone(), codec, processor);

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!(error = %e, "server failed");
                std::process::exit(1);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Stopping ISO-8583 TCP server...");
        }
    }
}
