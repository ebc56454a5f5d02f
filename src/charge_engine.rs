//! Fee, commission and settlement-account decomposition.
//!
//! Charges apply to money-moving transactions only (deposit, withdrawal,
//! purchase). The base charge is banded on the major-unit amount, then
//! split between the acquirer and the switch, with excise duty levied on
//! the total charge rather than the transaction amount.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::configure::EsbConfig;
use crate::models::{Charge, Commission, EsbRequest, TransactionType};

/// Hard ceiling in minor units (5,000,000 major).
pub const TRANSACTION_LIMIT_MINOR: u64 = 500_000_000;

#[derive(Debug, Clone)]
pub struct ChargeEngine {
    settlement_account: String,
    tax_account: String,
    pride_charge_account: String,
    inter_switch_charge_account: String,
    inter_switch_commissions_account: String,
    pride_commissions_settlement_account: String,
    base_initial: Decimal,
    band_size: Decimal,
    band_increment: Decimal,
    excise_rate: Decimal,
    pride_share_percent: Decimal,
    inter_switch_commission: Decimal,
}

impl ChargeEngine {
    pub fn new(cfg: &EsbConfig) -> Self {
        Self {
            settlement_account: cfg.inter_switch_settlement_account.clone(),
            tax_account: cfg.tax_account.clone(),
            pride_charge_account: cfg.pride_charge_account.clone(),
            inter_switch_charge_account: cfg.inter_switch_charge_account.clone(),
            inter_switch_commissions_account: cfg.inter_switch_commissions_account.clone(),
            pride_commissions_settlement_account: cfg.pride_commissions_settlement_account.clone(),
            base_initial: cfg.charges.base.initial,
            band_size: cfg.charges.base.band_size,
            band_increment: cfg.charges.base.increment,
            excise_rate: cfg.charges.excise.rate,
            pride_share_percent: cfg.charges.pride.share_percent,
            inter_switch_commission: cfg.charges.inter_switch.commission,
        }
    }

    pub fn settlement_account(&self) -> &str {
        &self.settlement_account
    }

    /// Minor-unit amount of a request, preferring the major `amount`.
    pub fn minor_amount(&self, request: &EsbRequest) -> Option<Decimal> {
        if let Some(amount) = request.amount {
            return Some(
                (amount * Decimal::from(100)).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero),
            );
        }
        let minor = request.amount_minor.as_deref()?;
        let digits: String = minor.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            return None;
        }
        digits.parse().ok()
    }

    pub fn exceeds_limit(&self, request: &EsbRequest) -> bool {
        match self.minor_amount(request) {
            Some(minor) => minor > Decimal::from(TRANSACTION_LIMIT_MINOR),
            None => false,
        }
    }

    fn major_amount(&self, request: &EsbRequest) -> Decimal {
        if let Some(amount) = request.amount {
            return amount;
        }
        self.minor_amount(request).map(|m| m / Decimal::from(100)).unwrap_or(Decimal::ZERO)
    }

    /// Banded base charge in whole major units.
    pub fn base_charge(&self, amount_major: Decimal) -> Decimal {
        if amount_major <= self.band_size {
            return self.base_initial;
        }
        let over = amount_major - self.band_size;
        let bands_beyond_first = (over / self.band_size).ceil();
        self.base_initial + self.band_increment * bands_beyond_first
    }

    pub fn build_charges(&self, transaction_type: TransactionType, request: &EsbRequest) -> Vec<Charge> {
        if !transaction_type.is_chargeable() {
            return Vec::new();
        }

        let base_charge = self.base_charge(self.major_amount(request));
        let pride_fee = round0(base_charge * self.pride_share_percent);
        let inter_switch_fee = base_charge - pride_fee;
        let excise = round0(base_charge * self.excise_rate);

        let mut charges = Vec::new();
        if pride_fee > Decimal::ZERO {
            charges.push(Charge {
                amount: pride_fee,
                description: "PRIDE CHARGE".to_string(),
                to_account: self.pride_charge_account.clone(),
            });
        }
        if inter_switch_fee > Decimal::ZERO {
            charges.push(Charge {
                amount: inter_switch_fee,
                description: "INTER SWITCH CHARGE".to_string(),
                to_account: self.inter_switch_charge_account.clone(),
            });
        }
        if excise > Decimal::ZERO {
            charges.push(Charge {
                amount: excise,
                description: "EXCISE DUTY".to_string(),
                to_account: self.tax_account.clone(),
            });
        }
        charges
    }

    /// Deposits carry a commission to the switch.
    pub fn commission_for(&self, external_ref: &str) -> Commission {
        Commission {
            from_account: self.pride_commissions_settlement_account.clone(),
            to_account: self.inter_switch_commissions_account.clone(),
            amount: self.inter_switch_commission,
            description: format!("Commission for {}", external_ref),
        }
    }

    /// Settlement-account routing: deposits move settlement -> customer,
    /// withdrawals and purchases move customer -> settlement.
    pub fn source_destination(
        &self,
        transaction_type: TransactionType,
        from_account: Option<String>,
        to_account: Option<String>,
    ) -> (Option<String>, Option<String>) {
        match transaction_type {
            TransactionType::Deposit => (Some(self.settlement_account.clone()), to_account),
            TransactionType::Withdrawal | TransactionType::Purchase => {
                (from_account, Some(self.settlement_account.clone()))
            }
            _ => (None, None),
        }
    }
}

fn round0(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}
