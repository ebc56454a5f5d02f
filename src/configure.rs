use config::{Config, ConfigError, File};
use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub esb: EsbConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub threads: usize,
    pub socket: SocketConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SocketConfig {
    pub timeout: SocketTimeoutConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SocketTimeoutConfig {
    pub ms: u64,
}

impl ServerConfig {
    pub fn socket_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.socket.timeout.ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EsbConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub withdrawal: String,
    pub deposit: String,
    pub purchase: String,
    pub balance_inquiry: String,
    pub mini_statement: String,
    pub inter_switch_settlement_account: String,
    pub tax_account: String,
    pub pride_charge_account: String,
    pub inter_switch_charge_account: String,
    pub inter_switch_commissions_account: String,
    pub pride_commissions_settlement_account: String,
    pub charges: ChargesConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChargesConfig {
    pub base: BaseChargeConfig,
    pub excise: ExciseConfig,
    pub pride: PrideConfig,
    pub inter_switch: InterSwitchConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BaseChargeConfig {
    pub initial: Decimal,
    pub band_size: Decimal,
    pub increment: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExciseConfig {
    pub rate: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrideConfig {
    pub share_percent: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InterSwitchConfig {
    pub commission: Decimal,
}

pub fn load_config() -> Result<AppConfig, ConfigError> {
    let s = Config::builder()
        // Set defaults
        .set_default("server.port", 7790)?
        .set_default("server.threads", 20)?
        .set_default("server.socket.timeout.ms", 300_000)?
        .set_default("esb.base_url", "http://localhost:8280")?
        .set_default("esb.username", "")?
        .set_default("esb.password", "")?
        .set_default("esb.withdrawal", "/atm/withdrawal")?
        .set_default("esb.deposit", "/atm/deposit")?
        .set_default("esb.purchase", "/atm/purchase")?
        .set_default("esb.balance_inquiry", "/atm/balance-inquiry")?
        .set_default("esb.mini_statement", "/atm/mini-statement")?
        .set_default("esb.inter_switch_settlement_account", "")?
        .set_default("esb.tax_account", "")?
        .set_default("esb.pride_charge_account", "")?
        .set_default("esb.inter_switch_charge_account", "")?
        .set_default("esb.inter_switch_commissions_account", "")?
        .set_default("esb.pride_commissions_settlement_account", "")?
        .set_default("esb.charges.base.initial", 2500)?
        .set_default("esb.charges.base.band_size", 500_000)?
        .set_default("esb.charges.base.increment", 1000)?
        .set_default("esb.charges.excise.rate", 0.0)?
        .set_default("esb.charges.pride.share_percent", 0.20)?
        .set_default("esb.charges.inter_switch.commission", 0)?
        // Add configuration from a file
        .add_source(File::with_name("config/gateway").required(false))
        // Add configuration from environment variables
        .add_source(config::Environment::with_prefix("GATEWAY").separator("__"))
        .build()?;

    s.try_deserialize()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self { server: ServerConfig::default(), esb: EsbConfig::default() }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 7790,
            threads: 20,
            socket: SocketConfig { timeout: SocketTimeoutConfig { ms: 300_000 } },
        }
    }
}

impl Default for EsbConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8280".to_string(),
            username: String::new(),
            password: String::new(),
            withdrawal: "/atm/withdrawal".to_string(),
            deposit: "/atm/deposit".to_string(),
            purchase: "/atm/purchase".to_string(),
            balance_inquiry: "/atm/balance-inquiry".to_string(),
            mini_statement: "/atm/mini-statement".to_string(),
            inter_switch_settlement_account: String::new(),
            tax_account: String::new(),
            pride_charge_account: String::new(),
            inter_switch_charge_account: String::new(),
            inter_switch_commissions_account: String::new(),
            pride_commissions_settlement_account: String::new(),
            charges: ChargesConfig::default(),
        }
    }
}

impl Default for ChargesConfig {
    fn default() -> Self {
        Self {
            base: BaseChargeConfig {
                initial: Decimal::from(2500),
                band_size: Decimal::from(500_000),
                increment: Decimal::from(1000),
            },
            excise: ExciseConfig { rate: Decimal::ZERO },
            pride: PrideConfig { share_percent: Decimal::new(20, 2) },
            inter_switch: InterSwitchConfig { commission: Decimal::ZERO },
        }
    }
}
