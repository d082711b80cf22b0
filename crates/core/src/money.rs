use rust_decimal::Decimal;
use std::fmt;
use std::ops::{Add, Neg, Sub};
use std::str::FromStr;
use thiserror::Error;

/// Currency markers stripped before parsing. Longer codes come first so
/// that `US$` and `R$` are removed before `$`.
const CURRENCY_MARKERS: &[&str] = &["US$", "R$", "EUR", "USD", "GBP", "CHF", "BRL", "€", "$", "£"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("Invalid number format: '{original}' (cleaned: '{cleaned}')")]
    InvalidNumberFormat { original: String, cleaned: String },
}

/// Exact signed amount. Negative values are outflows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(Decimal);

impl Money {
    pub fn from_decimal(decimal: Decimal) -> Self {
        Money(decimal)
    }

    /// Parses a locale-variant amount string, see [`normalize_amount`].
    pub fn parse(raw: &str) -> Result<Self, AmountError> {
        normalize_amount(raw).map(Money)
    }

    pub fn zero() -> Self {
        Money(Decimal::ZERO)
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn abs(self) -> Self {
        Money(self.0.abs())
    }

    pub fn as_decimal(self) -> Decimal {
        self.0
    }
}

impl From<Decimal> for Money {
    fn from(decimal: Decimal) -> Self {
        Money(decimal)
    }
}

impl FromStr for Money {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Money::parse(s)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Money(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Money(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Self;
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

/// Converts a raw numeric string in an unknown locale into an exact decimal.
///
/// Currency markers, whitespace (including non-breaking spaces) and a leading
/// `+` are stripped. Accounting negatives, `(12.34)` and `12.34-`, are
/// accepted. A string without commas that already parses is returned as is;
/// otherwise whichever of `,` and `.` occurs last is the decimal separator and
/// every other `,`, `.` or `'` is dropped as a thousands separator.
pub fn normalize_amount(raw: &str) -> Result<Decimal, AmountError> {
    let mut cleaned: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    for marker in CURRENCY_MARKERS {
        cleaned = cleaned.replace(marker, "");
    }

    let mut negative = false;
    if cleaned.len() > 2 && cleaned.starts_with('(') && cleaned.ends_with(')') {
        negative = true;
        cleaned = cleaned[1..cleaned.len() - 1].to_string();
    } else if cleaned.len() > 1 && cleaned.ends_with('-') {
        negative = true;
        cleaned.pop();
    }
    if let Some(rest) = cleaned.strip_prefix('+') {
        cleaned = rest.to_string();
    }

    let invalid = |cleaned: String| AmountError::InvalidNumberFormat {
        original: raw.to_string(),
        cleaned,
    };

    if !cleaned.contains(',') {
        if let Ok(value) = Decimal::from_str(&cleaned) {
            return Ok(if negative { -value } else { value });
        }
    }

    let separator = match (cleaned.rfind(','), cleaned.rfind('.')) {
        (Some(c), Some(d)) => Some(c.max(d)),
        (Some(c), None) => Some(c),
        (None, Some(d)) => Some(d),
        (None, None) => None,
    };

    let mut plain = String::with_capacity(cleaned.len());
    for (idx, c) in cleaned.char_indices() {
        if Some(idx) == separator {
            plain.push('.');
        } else if !matches!(c, ',' | '.' | '\'') {
            plain.push(c);
        }
    }

    let value = Decimal::from_str(&plain).map_err(|_| invalid(plain.clone()))?;
    Ok(if negative { -value } else { value })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    /// Formats `value` with grouped thousands using the given separators.
    fn format_grouped(value: Decimal, thousands: char, decimal: char) -> String {
        let text = format!("{:.2}", value.abs());
        let (int_part, frac_part) = text.split_once('.').unwrap();
        let mut grouped = String::new();
        for (i, c) in int_part.chars().enumerate() {
            if i > 0 && (int_part.len() - i) % 3 == 0 {
                grouped.push(thousands);
            }
            grouped.push(c);
        }
        let sign = if value.is_sign_negative() { "-" } else { "" };
        format!("{sign}{grouped}{decimal}{frac_part}")
    }

    #[test]
    fn plain_decimal() {
        assert_eq!(normalize_amount("123.45").unwrap(), dec("123.45"));
        assert_eq!(normalize_amount("-7").unwrap(), dec("-7"));
    }

    #[test]
    fn us_thousands() {
        assert_eq!(normalize_amount("1,234.56").unwrap(), dec("1234.56"));
        assert_eq!(normalize_amount("1,234,567.89").unwrap(), dec("1234567.89"));
    }

    #[test]
    fn eu_thousands() {
        assert_eq!(normalize_amount("1.234,56").unwrap(), dec("1234.56"));
        assert_eq!(normalize_amount("1.234.567,89").unwrap(), dec("1234567.89"));
    }

    #[test]
    fn eu_comma_only() {
        assert_eq!(normalize_amount("12,5").unwrap(), dec("12.5"));
        assert_eq!(normalize_amount("-0,99").unwrap(), dec("-0.99"));
    }

    #[test]
    fn currency_and_spaces_stripped() {
        assert_eq!(normalize_amount("1 234,56 €").unwrap(), dec("1234.56"));
        assert_eq!(normalize_amount("1\u{00A0}234,56\u{00A0}EUR").unwrap(), dec("1234.56"));
        assert_eq!(normalize_amount("$99.99").unwrap(), dec("99.99"));
        assert_eq!(normalize_amount("+15.00").unwrap(), dec("15.00"));
    }

    #[test]
    fn accounting_negatives() {
        assert_eq!(normalize_amount("(75.25)").unwrap(), dec("-75.25"));
        assert_eq!(normalize_amount("75,25-").unwrap(), dec("-75.25"));
    }

    #[test]
    fn invalid_reports_original_and_cleaned() {
        let err = normalize_amount("12 abc,5").unwrap_err();
        assert_eq!(
            err,
            AmountError::InvalidNumberFormat {
                original: "12 abc,5".to_string(),
                cleaned: "12abc.5".to_string(),
            }
        );
        assert!(normalize_amount("").is_err());
        assert!(normalize_amount("not_a_number").is_err());
    }

    #[test]
    fn round_trips_us_and_eu_formatting() {
        let samples = [
            "0.01", "0.99", "5.00", "12.30", "999.99", "1000.00", "1234.56", "-1234.56",
            "98765.43", "1000000.00", "-2500000.75", "123456789.01",
        ];
        for sample in samples {
            let value = dec(sample);
            let us = format_grouped(value, ',', '.');
            let eu = format_grouped(value, '.', ',');
            assert_eq!(normalize_amount(&us).unwrap(), value, "US form {us}");
            assert_eq!(normalize_amount(&eu).unwrap(), value, "EU form {eu}");
        }
    }

    #[test]
    fn money_arithmetic() {
        let a = Money::parse("10,50").unwrap();
        let b = Money::parse("0.50").unwrap();
        assert_eq!(a + b, Money::from_decimal(dec("11")));
        assert_eq!(a - b, Money::from_decimal(dec("10")));
        assert_eq!(-a, Money::from_decimal(dec("-10.5")));
        assert!((-a).is_negative());
        assert!(!Money::zero().is_negative());
    }

    #[test]
    fn money_equality_ignores_scale() {
        assert_eq!(Money::parse("500").unwrap(), Money::parse("500.00").unwrap());
    }
}
