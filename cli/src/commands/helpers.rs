use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use serde::Serialize;

use platecost_core::models::{MarginStatus, PricingMode};

/// Format integer cents as dollars ("$142.56").
pub(crate) fn fmt_cents(cents: i64) -> String {
    let dollars = cents as f64 / 100.0;
    format!("${dollars:.2}")
}

/// Format a fractional cents-per-base-unit rate ("0.8730¢").
pub(crate) fn fmt_rate(cents: f64) -> String {
    if cents >= 10.0 {
        format!("{cents:.1}¢")
    } else {
        format!("{cents:.4}¢")
    }
}

pub(crate) fn parse_date(date_str: Option<String>) -> Result<Option<NaiveDate>> {
    match date_str {
        None => Ok(None),
        Some(s) => match s.as_str() {
            "today" => Ok(Some(Local::now().date_naive())),
            "yesterday" => Ok(Some(Local::now().date_naive() - chrono::Duration::days(1))),
            _ => NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .map(Some)
                .with_context(|| format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday")),
        },
    }
}

/// Parse the `--mode` flag; omitted means most-recent prices.
pub(crate) fn parse_mode(mode: Option<&str>) -> Result<PricingMode> {
    match mode {
        None => Ok(PricingMode::Recent),
        Some(s) => s.parse(),
    }
}

pub(crate) fn status_label(status: MarginStatus) -> &'static str {
    status.as_str()
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}
