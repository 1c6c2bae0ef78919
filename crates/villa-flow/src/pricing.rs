//! Seasonal nightly-rate quoting.
//!
//! A quote is a proposal, never a commitment: the owner always has final say,
//! and the minimum-nights flag is advisory. Rates resolve per night so a stay
//! that straddles a season boundary is priced night by night.

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// Per-listing pricing document.
///
/// Season boundaries recur yearly and are stored as `MM-DD` strings; the
/// high-season range may wrap across year-end (`11-01`..`03-31`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingConfig {
    pub currency: String,
    pub low_season_rate: f64,
    pub high_season_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peak_season_rate: Option<f64>,
    pub high_season_start: String,
    pub high_season_end: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub peak_dates: Vec<String>,
    pub cleaning_fee: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_deposit: Option<f64>,
    pub minimum_nights: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_guests: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_guest_fee: Option<f64>,
}

impl PricingConfig {
    /// A zero nightly rate means "rate on request": callers skip quoting
    /// entirely. The decision is theirs, not this module's.
    pub fn is_rate_on_request(&self) -> bool {
        self.low_season_rate <= 0.0
    }
}

/// Fallback pricing for listings without a pricing document. The owner
/// reviews every quote before it becomes binding, so a generic table is safe.
pub fn default_pricing(currency: &str) -> PricingConfig {
    let peak_dates = [
        "12-20", "12-21", "12-22", "12-23", "12-24", "12-25", "12-26", "12-27", "12-28", "12-29",
        "12-30", "12-31", "01-01", "01-02", "01-03", "01-04", "01-05",
    ];
    PricingConfig {
        currency: currency.to_string(),
        low_season_rate: 500.0,
        high_season_rate: 800.0,
        peak_season_rate: Some(1200.0),
        high_season_start: "06-01".to_string(),
        high_season_end: "09-30".to_string(),
        peak_dates: peak_dates.iter().map(|d| d.to_string()).collect(),
        cleaning_fee: 250.0,
        security_deposit: None,
        minimum_nights: 3,
        base_guests: None,
        extra_guest_fee: None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Season {
    Low,
    High,
    Peak,
}

impl Season {
    pub const fn label(self) -> &'static str {
        match self {
            Season::Low => "low",
            Season::High => "high",
            Season::Peak => "peak",
        }
    }
}

/// One priced night of the stay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NightlyRate {
    pub date: NaiveDate,
    pub rate: f64,
    pub season: Season,
}

/// Full quote for a stay, including the per-night season tags surfaced to
/// the owner for review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteBreakdown {
    pub nights: i64,
    pub nightly_rates: Vec<NightlyRate>,
    pub accommodation_total: f64,
    pub cleaning_fee: f64,
    pub extra_guest_fee: f64,
    pub total: f64,
    pub currency: String,
    pub minimum_nights_met: bool,
    /// Refundable deposit, surfaced for the owner but never part of `total`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_deposit: Option<f64>,
}

fn mmdd(date: NaiveDate) -> String {
    format!("{:02}-{:02}", date.month(), date.day())
}

/// Season precedence: explicit peak dates, then the high-season range
/// (wrapping allowed), then low.
fn season_for(date: NaiveDate, pricing: &PricingConfig) -> Season {
    let key = mmdd(date);
    if pricing.peak_dates.iter().any(|d| d == &key) {
        return Season::Peak;
    }
    let start = pricing.high_season_start.as_str();
    let end = pricing.high_season_end.as_str();
    let in_high = if start <= end {
        key.as_str() >= start && key.as_str() <= end
    } else {
        key.as_str() >= start || key.as_str() <= end
    };
    if in_high {
        Season::High
    } else {
        Season::Low
    }
}

fn rate_for(date: NaiveDate, pricing: &PricingConfig) -> (f64, Season) {
    match season_for(date, pricing) {
        Season::Peak => (
            pricing.peak_season_rate.unwrap_or(pricing.high_season_rate),
            Season::Peak,
        ),
        Season::High => (pricing.high_season_rate, Season::High),
        Season::Low => (pricing.low_season_rate, Season::Low),
    }
}

/// Compute a quote: one rate lookup per night, flat cleaning fee, and an
/// extra-guest fee when the config defines per-person terms.
///
/// Pure over its inputs; identical arguments always produce an identical
/// breakdown.
pub fn calculate_quote(
    pricing: &PricingConfig,
    check_in: NaiveDate,
    check_out: NaiveDate,
    party_size: u32,
) -> QuoteBreakdown {
    let nights = (check_out - check_in).num_days().max(0);

    let mut nightly_rates = Vec::with_capacity(nights as usize);
    let mut accommodation_total = 0.0;
    for offset in 0..nights {
        let date = check_in + Duration::days(offset);
        let (rate, season) = rate_for(date, pricing);
        accommodation_total += rate;
        nightly_rates.push(NightlyRate { date, rate, season });
    }

    let extra_guest_fee = match (pricing.base_guests, pricing.extra_guest_fee) {
        (Some(base), Some(fee)) if party_size > base => {
            f64::from(party_size - base) * fee * nights as f64
        }
        _ => 0.0,
    };

    let total = accommodation_total + pricing.cleaning_fee + extra_guest_fee;

    QuoteBreakdown {
        nights,
        nightly_rates,
        accommodation_total,
        cleaning_fee: pricing.cleaning_fee,
        extra_guest_fee,
        total,
        currency: pricing.currency.clone(),
        minimum_nights_met: nights >= i64::from(pricing.minimum_nights),
        security_deposit: pricing.security_deposit.filter(|d| *d > 0.0),
    }
}

/// Display symbol for a currency code; unknown codes fall back to `CODE `.
pub fn currency_symbol(currency: &str) -> &'static str {
    match currency.to_ascii_uppercase().as_str() {
        "EUR" => "€",
        "USD" => "$",
        "GBP" => "£",
        "CHF" => "CHF ",
        "COP" => "COP $",
        "MXN" => "MX$",
        "BRL" => "R$",
        "ARS" => "ARS $",
        "CAD" => "CA$",
        "AUD" => "A$",
        "NZD" => "NZ$",
        "ZAR" => "R",
        "THB" => "฿",
        "IDR" => "Rp",
        "MYR" => "RM",
        "AED" => "AED ",
        "SAR" => "SAR ",
        "INR" => "₹",
        "JPY" => "¥",
        "CNY" => "¥",
        "KRW" => "₩",
        "SEK" => "kr",
        "NOK" => "kr",
        "DKK" => "kr",
        "PLN" => "zł",
        "CZK" => "Kč",
        "HUF" => "Ft",
        "TRY" => "₺",
        "ILS" => "₪",
        "RON" => "lei",
        "BGN" => "лв",
        _ => "",
    }
}

/// `€5,850`-style rendering used in emails and on the owner pages.
pub fn format_money(amount: f64, currency: &str) -> String {
    let symbol = currency_symbol(currency);
    let rendered = crate::signing::format_amount(amount);
    if symbol.is_empty() {
        format!("{currency} {rendered}")
    } else {
        format!("{symbol}{rendered}")
    }
}

/// Plain-text quote summary for the owner notification.
pub fn format_quote(quote: &QuoteBreakdown) -> String {
    let mut lines = vec![format!(
        "{} nights accommodation: {}",
        quote.nights,
        format_money(quote.accommodation_total, &quote.currency)
    )];
    if quote.cleaning_fee > 0.0 {
        lines.push(format!(
            "Cleaning fee: {}",
            format_money(quote.cleaning_fee, &quote.currency)
        ));
    }
    if quote.extra_guest_fee > 0.0 {
        lines.push(format!(
            "Extra guest fee: {}",
            format_money(quote.extra_guest_fee, &quote.currency)
        ));
    }
    lines.push(String::new());
    lines.push(format!(
        "Total: {}",
        format_money(quote.total, &quote.currency)
    ));
    if let Some(deposit) = quote.security_deposit {
        lines.push(format!(
            "Refundable security deposit: {} (not included in total)",
            format_money(deposit, &quote.currency)
        ));
    }
    if !quote.minimum_nights_met {
        lines.push(String::new());
        lines.push("Note: this stay is below the minimum night requirement.".to_string());
    }
    lines.join("\n")
}
