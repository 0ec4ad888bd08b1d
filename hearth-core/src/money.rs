use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::error::ServiceError;

/// Money is decimal throughout: NUMERIC in the database, decimal strings on
/// the wire. Floats never touch an amount.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PriceBreakdown {
    pub nightly_subtotal: Decimal,
    pub cleaning_fee: Decimal,
    pub platform_fee: Decimal,
    pub total: Decimal,
    pub currency: String,
}

/// `total = price_per_night * nights + cleaning_fee + platform_fee`, where the
/// platform fee is a percentage of the nightly subtotal. Amounts round
/// half-even to two decimal places.
pub fn compute_breakdown(
    price_per_night: Decimal,
    nights: i64,
    cleaning_fee: Decimal,
    platform_fee_percent: Decimal,
    currency: &str,
) -> Result<PriceBreakdown, ServiceError> {
    if nights <= 0 {
        return Err(ServiceError::bad_request("stay must be at least one night"));
    }
    if price_per_night.is_sign_negative()
        || cleaning_fee.is_sign_negative()
        || platform_fee_percent.is_sign_negative()
    {
        return Err(ServiceError::bad_request("amounts must not be negative"));
    }

    let nightly_subtotal = round(price_per_night * Decimal::from(nights));
    let platform_fee = round(nightly_subtotal * platform_fee_percent / Decimal::ONE_HUNDRED);
    let cleaning_fee = round(cleaning_fee);
    let total = nightly_subtotal + cleaning_fee + platform_fee;

    Ok(PriceBreakdown {
        nightly_subtotal,
        cleaning_fee,
        platform_fee,
        total,
        currency: currency.to_owned(),
    })
}

fn round(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
}
