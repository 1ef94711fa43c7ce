use bigdecimal::{BigDecimal, RoundingMode};

use crate::db::models::{FeeSplit, TenantProvider};

/// Percentage (fraction of gross, e.g. 0.02) plus fixed fee.
#[derive(Debug, Clone)]
pub struct FeeConfig {
    pub percentage: BigDecimal,
    pub fixed: BigDecimal,
}

/// Computed split of a gross amount. Conservation invariant:
/// `gross == platform_fee + tenant_net`, exactly, at scale 2.
#[derive(Debug, Clone)]
pub struct FeeBreakdown {
    pub gross: BigDecimal,
    pub percentage_fee: BigDecimal,
    pub fixed_fee: BigDecimal,
    pub platform_fee: BigDecimal,
    pub tenant_net: BigDecimal,
}

/// Computes the platform's cut of each charge. Rounding policy (2 decimal
/// places, half-up) is fixed here at split-creation time.
#[derive(Debug, Clone)]
pub struct FeeSplitCalculator {
    default_config: FeeConfig,
}

impl FeeSplitCalculator {
    pub fn new(default_percentage: BigDecimal, default_fixed: BigDecimal) -> Self {
        Self {
            default_config: FeeConfig {
                percentage: default_percentage,
                fixed: default_fixed,
            },
        }
    }

    /// Provider configs may override either component; missing values fall
    /// back to the platform default.
    pub fn config_for(&self, provider_config: &TenantProvider) -> FeeConfig {
        FeeConfig {
            percentage: provider_config
                .percentage_fee
                .clone()
                .unwrap_or_else(|| self.default_config.percentage.clone()),
            fixed: provider_config
                .fixed_fee
                .clone()
                .unwrap_or_else(|| self.default_config.fixed.clone()),
        }
    }

    pub fn split(&self, gross: &BigDecimal, config: &FeeConfig) -> FeeBreakdown {
        let percentage_fee = round2(&(gross * &config.percentage));
        let fixed_fee = round2(&config.fixed);
        let platform_fee = &percentage_fee + &fixed_fee;
        // Net is the exact complement, so gross == fee + net always holds.
        let tenant_net = round2(gross) - &platform_fee;

        FeeBreakdown {
            gross: round2(gross),
            percentage_fee,
            fixed_fee,
            platform_fee,
            tenant_net,
        }
    }

    /// Proportional adjustment for a partial refund: the fee shrinks by the
    /// refund's share of the remaining unrefunded value (`fee + net`, which
    /// equals the gross on the first refund), the net by the remainder of
    /// the refund. Sequential partial refunds therefore drain both
    /// components to exactly zero. Clamps at zero rather than going
    /// negative, which would indicate a refund-limit bug upstream.
    pub fn adjust_for_refund(
        &self,
        split: &FeeSplit,
        refund_amount: &BigDecimal,
    ) -> (BigDecimal, BigDecimal) {
        let zero = BigDecimal::from(0);
        let remaining = &split.platform_fee + &split.tenant_net_amount;
        if remaining <= zero {
            return (zero.clone(), zero);
        }

        let fee_delta = round2(&(&split.platform_fee * refund_amount / &remaining));
        let net_delta = round2(refund_amount) - &fee_delta;

        let mut new_fee = &split.platform_fee - &fee_delta;
        let mut new_net = &split.tenant_net_amount - &net_delta;

        if new_fee < zero {
            tracing::error!(
                transaction_id = %split.transaction_id,
                platform_fee = %split.platform_fee,
                fee_delta = %fee_delta,
                "fee split adjustment would drive platform fee negative, clamping"
            );
            new_fee = zero.clone();
        }
        if new_net < zero {
            tracing::error!(
                transaction_id = %split.transaction_id,
                tenant_net = %split.tenant_net_amount,
                net_delta = %net_delta,
                "fee split adjustment would drive tenant net negative, clamping"
            );
            new_net = zero;
        }

        (new_fee, new_net)
    }
}

pub fn round2(amount: &BigDecimal) -> BigDecimal {
    amount.with_scale_round(2, RoundingMode::HalfUp)
}
