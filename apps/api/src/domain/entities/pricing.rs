//! Catalog price arithmetic. Amounts are integer cents.

/// Validated discount percentage: `Some(pct)` with `0 < pct < 100`, or `None`.
pub fn validate_discount(
    is_discounted: bool,
    discount_percent: Option<f64>,
) -> Result<Option<f64>, String> {
    if !is_discounted {
        return Ok(None);
    }
    match discount_percent {
        Some(pct) if pct > 0.0 && pct < 100.0 => Ok(Some(pct)),
        Some(pct) => Err(format!(
            "Discount percent must be between 0 and 100 (exclusive), got {}",
            pct
        )),
        None => Err("Discount percent is required when a plan is discounted".to_string()),
    }
}

/// `price × (1 − pct/100)`, rounded to the nearest cent.
pub fn discounted_price_cents(price_cents: i64, discount_percent: Option<f64>) -> i64 {
    match discount_percent {
        Some(pct) if pct > 0.0 && pct < 100.0 => {
            (price_cents as f64 * (1.0 - pct / 100.0)).round() as i64
        }
        _ => price_cents,
    }
}

pub fn cents_to_decimal(cents: i64) -> f64 {
    cents as f64 / 100.0
}
