//! Regex heuristics over assistant text. Every miss is an absent field.
//!
//! Digit classes are ASCII-only (`[0-9]`) so a run of other-script digits
//! never shadows a later parseable number.

use regex::Regex;
use shopsignal_core::types::HeuristicsBlock;
use std::sync::LazyLock;

static RE_URL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://[^\s)]+").unwrap());
static RE_PRICE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:₹|INR|Rs\.?|USD|\$)\s?[0-9]{1,3}(?:[0-9,]*)(?:[.,][0-9]{2})?").unwrap()
});
static RE_RATING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)([0-5](?:\.[0-9])?)\s*(?:out of|/|of)\s*5|([0-5](?:\.[0-9])?)\s*stars").unwrap()
});
static RE_REVIEWS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)([0-9][0-9,]*)\s*(?:reviews|ratings)").unwrap());
static RE_FREE_DELIVERY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)free\s+delivery|Spend\s*[₹$]?([0-9,]+)\s*for\s*free\s*delivery").unwrap()
});
static RE_MIN_SPEND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Spend\s*[₹$]?([0-9,]+)\s*for\s*free\s*delivery").unwrap()
});

/// First match wins, in this order.
static MERCHANTS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"(?i)amazon", "Amazon"),
        (r"(?i)flipkart", "Flipkart"),
        (r"(?i)myntra", "Myntra"),
        (r"(?i)best\s*buy", "Best Buy"),
        (r"(?i)walmart", "Walmart"),
    ]
    .into_iter()
    .map(|(p, name)| (Regex::new(p).unwrap(), name))
    .collect()
});

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Heuristics {
    pub urls: Vec<String>,
    pub price_text: Option<String>,
    pub price_numeric: Option<f64>,
    pub avg_rating: Option<f64>,
    pub num_ratings: Option<u64>,
    pub free_delivery: bool,
    pub min_spend_for_free_delivery: Option<u64>,
    pub merchant_default: Option<String>,
}

impl Heuristics {
    /// The nested block of the aggregate payload.
    pub fn to_block(&self) -> HeuristicsBlock {
        HeuristicsBlock {
            urls: self.urls.clone(),
            price_text: self.price_text.clone(),
            avg_rating: self.avg_rating,
            num_ratings: self.num_ratings,
            free_delivery: self.free_delivery,
            min_spend_for_free_delivery: self.min_spend_for_free_delivery,
        }
    }
}

pub fn extract_heuristics(text: &str) -> Heuristics {
    let urls = RE_URL.find_iter(text).map(|m| m.as_str().to_string()).collect();
    let price_text = RE_PRICE.find(text).map(|m| m.as_str().to_string());
    let price_numeric = price_text.as_deref().and_then(parse_price);

    let avg_rating = RE_RATING.captures(text).and_then(|c| {
        c.get(1)
            .or_else(|| c.get(2))
            .and_then(|m| m.as_str().parse::<f64>().ok())
    });
    let num_ratings = RE_REVIEWS
        .captures(text)
        .and_then(|c| parse_grouped(&c[1]));
    let min_spend_for_free_delivery = RE_MIN_SPEND
        .captures(text)
        .and_then(|c| parse_grouped(&c[1]));

    let merchant_default = MERCHANTS
        .iter()
        .find(|(rx, _)| rx.is_match(text))
        .map(|(_, name)| name.to_string());

    Heuristics {
        urls,
        price_text,
        price_numeric,
        avg_rating,
        num_ratings,
        free_delivery: RE_FREE_DELIVERY.is_match(text),
        min_spend_for_free_delivery,
        merchant_default,
    }
}

/// Numeric magnitude of a price token: strip everything but digits and dots,
/// then read the longest leading decimal. Zero counts as absent.
pub fn parse_price(price_text: &str) -> Option<f64> {
    let residue: String = price_text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    // Currency abbreviations like "Rs." leave a leading dot behind.
    let residue = residue.trim_start_matches('.');

    let mut end = 0;
    let mut seen_dot = false;
    for (i, c) in residue.char_indices() {
        match c {
            '0'..='9' => end = i + 1,
            '.' if !seen_dot => seen_dot = true,
            _ => break,
        }
    }
    residue[..end]
        .parse::<f64>()
        .ok()
        .filter(|v| *v != 0.0)
}

/// Digit group with thousands separators removed.
fn parse_grouped(raw: &str) -> Option<u64> {
    raw.replace(',', "").parse().ok()
}
