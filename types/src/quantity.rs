use rust_decimal::Decimal;

/// Largest pool size or grant quantity accepted (10^15 options).
///
/// Quantity × strike and the vesting fractions stay inside `Decimal`'s
/// 96-bit mantissa for every value up to these bounds.
pub const MAX_QUANTITY: Decimal = Decimal::from_parts(0xA4C6_8000, 0x0003_8D7E, 0, false, 0);

/// Largest strike price accepted (10^9 per option).
pub const MAX_STRIKE_PRICE: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

/// Options are indivisible: a valid quantity is a positive whole number.
#[must_use]
pub fn is_positive_whole(quantity: Decimal) -> bool {
    quantity > Decimal::ZERO && quantity.fract().is_zero()
}

/// A positive whole number no larger than [`MAX_QUANTITY`].
#[must_use]
pub fn is_valid_quantity(quantity: Decimal) -> bool {
    is_positive_whole(quantity) && quantity <= MAX_QUANTITY
}

/// Positive and no larger than [`MAX_STRIKE_PRICE`].
#[must_use]
pub fn is_valid_strike_price(price: Decimal) -> bool {
    price > Decimal::ZERO && price <= MAX_STRIKE_PRICE
}

/// `part / whole × 100`, rounded half-even to two places and always
/// rendered with two fractional digits (`"100.00"`).
#[must_use]
pub fn percentage(part: Decimal, whole: Decimal) -> Decimal {
    let mut pct = if whole.is_zero() {
        Decimal::ZERO
    } else {
        (part / whole * Decimal::ONE_HUNDRED).round_dp(2)
    };
    pct.rescale(2);
    pct
}
