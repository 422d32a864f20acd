//! Prompt formatting for finance records

use super::{uncleared, ChequeDirection};
use crate::models::Record;
use serde_json::Value;

const CRORE: f64 = 10_000_000.0;
const LAKH: f64 = 100_000.0;

/// Numeric view of a JSON value; strings are parsed, anything else is zero.
pub fn number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.replace(',', "").trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Indian-style amount: crores, lakhs, else whole rupees.
pub fn format_currency(amount: f64) -> String {
    if amount >= CRORE {
        format!("₹{:.2} Cr", amount / CRORE)
    } else if amount >= LAKH {
        format!("₹{:.2} L", amount / LAKH)
    } else {
        format!("₹{}", group_thousands(amount.round() as i64))
    }
}

fn group_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if value < 0 {
        out.insert(0, '-');
    }
    out
}

/// Pretty JSON of the records, or a fixed line when there are none.
pub fn format_records(records: &[Record]) -> String {
    if records.is_empty() {
        return "No data available.".to_string();
    }
    serde_json::to_string_pretty(records).unwrap_or_else(|_| "No data available.".to_string())
}

/// Count and total value of the records.
pub fn format_summary(records: &[Record]) -> String {
    if records.is_empty() {
        return "None".to_string();
    }
    let total: f64 = records.iter().map(record_value).sum();
    format!("Count: {}, Total Value: {:.2}", records.len(), total)
}

/// First non-zero of the amount fields a record may carry.
fn record_value(record: &Record) -> f64 {
    ["total_amount", "net_payable", "net_receivable"]
        .iter()
        .map(|key| record.get(*key).map(number).unwrap_or(0.0))
        .find(|v| *v != 0.0)
        .unwrap_or(0.0)
}

/// Vendor or client master data, with a fallback line when empty.
pub fn format_master(records: &[Record], empty: &str) -> String {
    if records.is_empty() {
        return empty.to_string();
    }
    format_records(records)
}

pub fn format_uncleared_cheques(cheques: &[Record], direction: ChequeDirection) -> String {
    let pending = uncleared(cheques, direction);
    if pending.is_empty() {
        return "None".to_string();
    }
    format_records(&pending)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records(value: Value) -> Vec<Record> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect()
    }

    #[test]
    fn test_format_currency() {
        assert_eq!(format_currency(25_000_000.0), "₹2.50 Cr");
        assert_eq!(format_currency(450_000.0), "₹4.50 L");
        assert_eq!(format_currency(75_000.0), "₹75,000");
        assert_eq!(format_currency(999.4), "₹999");
        assert_eq!(format_currency(0.0), "₹0");
    }

    #[test]
    fn test_number_accepts_strings() {
        assert_eq!(number(&json!("1,18,000")), 118_000.0);
        assert_eq!(number(&json!(12.5)), 12.5);
        assert_eq!(number(&json!(null)), 0.0);
    }

    #[test]
    fn test_format_summary() {
        assert_eq!(format_summary(&[]), "None");
        let items = records(json!([
            {"total_amount": 0, "net_payable": 100.0},
            {"total_amount": 50.5}
        ]));
        assert_eq!(format_summary(&items), "Count: 2, Total Value: 150.50");
    }

    #[test]
    fn test_empty_fallbacks() {
        assert_eq!(format_records(&[]), "No data available.");
        assert_eq!(format_master(&[], "No vendor master data."), "No vendor master data.");

        let cheques = records(json!([{"type": "issued", "status": "cleared"}]));
        assert_eq!(format_uncleared_cheques(&cheques, ChequeDirection::Issued), "None");
    }
}
