/// Money is represented as integer cents to avoid floating-point precision issues.
/// For EUR/USD, 1 unit = 100 cents, so €50.00 = 5000 cents.
pub type Cents = i64;

/// Format cents as a human-readable currency string.
/// Example: 5000 -> "50.00", -1234 -> "-12.34"
pub fn format_cents(cents: Cents) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs_cents = cents.abs();
    let units = abs_cents / 100;
    let remainder = abs_cents % 100;
    format!("{}{}.{:02}", sign, units, remainder)
}

/// Compute the VAT amount for a subtotal at the given percentage,
/// rounded to the nearest cent.
pub fn vat_amount(subtotal: Cents, vat_percent: f64) -> Cents {
    ((subtotal as f64) * vat_percent / 100.0).round() as Cents
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_cents() {
        assert_eq!(format_cents(5000), "50.00");
        assert_eq!(format_cents(1234), "12.34");
        assert_eq!(format_cents(100), "1.00");
        assert_eq!(format_cents(1), "0.01");
        assert_eq!(format_cents(0), "0.00");
        assert_eq!(format_cents(-5000), "-50.00");
        assert_eq!(format_cents(-1), "-0.01");
    }

    #[test]
    fn test_vat_amount() {
        assert_eq!(vat_amount(8000, 20.0), 1600);
        assert_eq!(vat_amount(10000, 18.0), 1800);
        assert_eq!(vat_amount(0, 20.0), 0);
        assert_eq!(vat_amount(8000, 0.0), 0);
        // 33.33 at 20% = 6.666 -> rounds to 6.67
        assert_eq!(vat_amount(3333, 20.0), 667);
    }
}
