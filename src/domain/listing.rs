//! Scraped listing record and its price representation.

use chrono::{DateTime, Utc};
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Literal sentinel the marketplace shows instead of a numeric price.
pub const PRICE_ON_REQUEST: &str = "price on request";

/// Price resolved from a listing's price area.
///
/// A listing either carries a numeric amount or the "price on request"
/// sentinel; a listing with neither is not a valid record.
#[derive(Debug, Clone, PartialEq)]
pub enum Price {
    Amount(f64),
    OnRequest,
}

impl Price {
    /// Numeric amount, if this is not the sentinel.
    pub fn amount(&self) -> Option<f64> {
        match self {
            Self::Amount(value) => Some(*value),
            Self::OnRequest => None,
        }
    }

    pub fn is_on_request(&self) -> bool {
        matches!(self, Self::OnRequest)
    }
}

// Wire form: a JSON number, or the literal sentinel string.
impl Serialize for Price {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Amount(value) => serializer.serialize_f64(*value),
            Self::OnRequest => serializer.serialize_str(PRICE_ON_REQUEST),
        }
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::Number(number) => number
                .as_f64()
                .map(Self::Amount)
                .ok_or_else(|| D::Error::custom("price is not representable as f64")),
            Value::String(text) if text.trim().eq_ignore_ascii_case(PRICE_ON_REQUEST) => {
                Ok(Self::OnRequest)
            }
            other => Err(D::Error::custom(format!("invalid price value: {other}"))),
        }
    }
}

/// Single scraped listing.
///
/// Immutable once created; a later scrape of the same URL produces a new
/// record with a newer `scraped_at`, never an update in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingRecord {
    /// Attributes of the search query that produced this record, stored
    /// verbatim for provenance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_attributes: Option<Value>,
    pub listing_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listing_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Price>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub movement: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_material: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub production_year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_number: Option<String>,
    /// Assigned by the persistence layer at insert time, not at extraction
    /// time; this is the field "latest" ranking is based on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scraped_at: Option<DateTime<Utc>>,
}

impl ListingRecord {
    /// URL, title and a resolved price are jointly required; anything less
    /// is discarded before persistence.
    pub fn has_required_fields(&self) -> bool {
        !self.listing_url.trim().is_empty()
            && self
                .listing_title
                .as_deref()
                .is_some_and(|title| !title.trim().is_empty())
            && self.price.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn price_serializes_to_number_or_sentinel() {
        assert_eq!(serde_json::to_value(Price::Amount(12345.0)).unwrap(), json!(12345.0));
        assert_eq!(
            serde_json::to_value(Price::OnRequest).unwrap(),
            json!("price on request")
        );
    }

    #[test]
    fn price_deserializes_sentinel_case_insensitively() {
        let price: Price = serde_json::from_value(json!("Price On Request")).unwrap();
        assert_eq!(price, Price::OnRequest);

        let price: Price = serde_json::from_value(json!(99.5)).unwrap();
        assert_eq!(price, Price::Amount(99.5));

        assert!(serde_json::from_value::<Price>(json!("N/A")).is_err());
    }

    #[test]
    fn required_fields_need_url_title_and_price() {
        let record = ListingRecord {
            input_attributes: None,
            listing_url: "https://example.com/w/1".to_string(),
            listing_title: Some("Rolex Submariner".to_string()),
            brand: None,
            model: None,
            price: Some(Price::OnRequest),
            currency: None,
            movement: None,
            case_material: None,
            production_year: None,
            condition: None,
            location: None,
            reference_number: None,
            scraped_at: None,
        };
        assert!(record.has_required_fields());

        let mut missing_price = record.clone();
        missing_price.price = None;
        assert!(!missing_price.has_required_fields());

        let mut blank_title = record.clone();
        blank_title.listing_title = Some("  ".to_string());
        assert!(!blank_title.has_required_fields());

        let mut blank_url = record;
        blank_url.listing_url = String::new();
        assert!(!blank_url.has_required_fields());
    }
}
