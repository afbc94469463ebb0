//! Heuristic extraction of listing records from search-result markup.
//!
//! Extraction is a pure function of the markup and the input attributes:
//! malformed input produces zero records rather than failing the call, and
//! individual elements that miss a required field are skipped and logged
//! with their index. Output follows document order; deduplication is a
//! read-time concern of the repository, not of extraction.

use lazy_static::lazy_static;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use super::error::{ParsingError, ParsingResult};
use super::selectors::{labels, ExtractionSelectors};
use crate::domain::listing::{ListingRecord, Price, PRICE_ON_REQUEST};
use crate::infrastructure::config::ScraperConfig;

lazy_static! {
    static ref CURRENCY_RE: Regex = Regex::new(r"([$€£¥₹]|\b[A-Z]{3}\b)").unwrap();
    static ref AMOUNT_RE: Regex = Regex::new(r"[0-9][0-9,]*(?:\.[0-9]+)?").unwrap();
}

#[derive(Debug, Clone)]
struct CompiledSelectors {
    listing_container: Selector,
    listing_link: Selector,
    primary_title: Selector,
    secondary_title: Selector,
    price_area: Selector,
    details_container: Selector,
    detail_pair: Selector,
    detail_label: Selector,
    detail_value: Selector,
    detail_value_emphasis: Selector,
}

/// Parser turning one search-result page into zero or more listing records.
#[derive(Debug, Clone)]
pub struct ListingParser {
    base_url: Url,
    known_brands: Vec<String>,
    selectors: CompiledSelectors,
}

impl ListingParser {
    /// Create a parser with the default marketplace selectors.
    pub fn new(config: &ScraperConfig) -> ParsingResult<Self> {
        Self::with_selectors(config, &ExtractionSelectors::default())
    }

    pub fn with_selectors(
        config: &ScraperConfig,
        selectors: &ExtractionSelectors,
    ) -> ParsingResult<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| ParsingError::InvalidBaseUrl {
            url: config.base_url.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            base_url,
            known_brands: config.known_brands_set(),
            selectors: CompiledSelectors {
                listing_container: compile(&selectors.listing_container)?,
                listing_link: compile(&selectors.listing_link)?,
                primary_title: compile(&selectors.primary_title)?,
                secondary_title: compile(&selectors.secondary_title)?,
                price_area: compile(&selectors.price_area)?,
                details_container: compile(&selectors.details_container)?,
                detail_pair: compile(&selectors.detail_pair)?,
                detail_label: compile(&selectors.detail_label)?,
                detail_value: compile(&selectors.detail_value)?,
                detail_value_emphasis: compile(&selectors.detail_value_emphasis)?,
            },
        })
    }

    /// Extract all valid listings from a page, in document order.
    pub fn extract(&self, html: &str, input_attributes: Option<&Value>) -> Vec<ListingRecord> {
        debug!(length = html.len(), "parsing listings from markup");
        let document = Html::parse_document(html);

        let mut records = Vec::new();
        let mut skipped = 0usize;
        for (index, element) in document.select(&self.selectors.listing_container).enumerate() {
            match self.extract_listing(&element, index, input_attributes) {
                Some(record) => records.push(record),
                None => skipped += 1,
            }
        }

        if records.is_empty() {
            warn!("no listings parsed from markup");
        } else {
            info!(parsed = records.len(), skipped, "parsed listings from markup");
        }
        records
    }

    fn extract_listing(
        &self,
        element: &ElementRef,
        index: usize,
        input_attributes: Option<&Value>,
    ) -> Option<ListingRecord> {
        let listing_url = self.extract_url(element);

        let primary = self.text_of(element, &self.selectors.primary_title);
        let secondary = self.text_of(element, &self.selectors.secondary_title);
        let (brand, model, full_title) =
            self.resolve_brand_model(primary.as_deref(), secondary.as_deref());

        let price_text = self.text_of(element, &self.selectors.price_area);
        let (price, currency) = parse_price_currency(price_text.as_deref());

        let details = element.select(&self.selectors.details_container).next();
        let movement = self.detail_value(details.as_ref(), labels::MOVEMENT);
        let case_material = self.detail_value(details.as_ref(), labels::CASE_MATERIAL);
        let production_year = self
            .detail_value(details.as_ref(), labels::YEAR_OF_PRODUCTION)
            .and_then(|year| parse_year(&year));
        let condition = self.detail_value(details.as_ref(), labels::CONDITION);
        let location = self.detail_value(details.as_ref(), labels::LOCATION);
        let reference_number = self.detail_value(details.as_ref(), labels::REFERENCE_NUMBER);

        match (listing_url, full_title, price) {
            (Some(listing_url), Some(listing_title), Some(price)) => Some(ListingRecord {
                input_attributes: input_attributes.cloned(),
                listing_url,
                listing_title: Some(listing_title),
                brand,
                model,
                price: Some(price),
                currency,
                movement,
                case_material,
                production_year,
                condition,
                location,
                reference_number,
                scraped_at: None,
            }),
            (url, title, price) => {
                warn!(
                    element = index + 1,
                    has_url = url.is_some(),
                    has_title = title.is_some(),
                    has_price = price.is_some(),
                    "skipped listing element with missing required fields"
                );
                None
            }
        }
    }

    /// Listing URL from the element's link anchor; relative paths are
    /// joined against the configured base URL.
    fn extract_url(&self, element: &ElementRef) -> Option<String> {
        let href = element
            .select(&self.selectors.listing_link)
            .next()?
            .value()
            .attr("href")?
            .trim();
        if href.is_empty() {
            return None;
        }
        if href.starts_with("http") {
            return Some(href.to_string());
        }
        match self.base_url.join(href) {
            Ok(resolved) => Some(resolved.to_string()),
            Err(e) => {
                debug!(href, error = %e, "could not resolve listing href");
                None
            }
        }
    }

    /// Brand/model resolution from the two title lines.
    ///
    /// Heuristic tie-break order, preserved deliberately ("not an exact
    /// science"):
    /// 1. primary line starts with a known brand -> split there
    /// 2. primary line contains a space -> first token is the brand
    /// 3. primary line itself is a known brand -> brand only
    /// 4. otherwise the whole primary line is the model
    /// A secondary line becomes the model when none was resolved or when
    /// brand and model coincide.
    fn resolve_brand_model(
        &self,
        line1: Option<&str>,
        line2: Option<&str>,
    ) -> (Option<String>, Option<String>, Option<String>) {
        let line1 = line1.map(str::trim).filter(|s| !s.is_empty());
        let line2 = line2.map(str::trim).filter(|s| !s.is_empty());

        let full_title = match (line1, line2) {
            (Some(a), Some(b)) => Some(format!("{a} {b}")),
            (Some(a), None) => Some(a.to_string()),
            (None, Some(b)) => Some(b.to_string()),
            (None, None) => None,
        };

        let mut brand: Option<String> = None;
        let mut model: Option<String> = None;

        if let Some(line1) = line1 {
            let line1_lower = line1.to_lowercase();
            for known in &self.known_brands {
                if line1_lower.starts_with(known.as_str()) {
                    brand = Some(line1_lower[..known.len()].to_string());
                    let rest = line1_lower[known.len()..].trim();
                    if !rest.is_empty() {
                        model = Some(rest.to_string());
                    }
                    break;
                }
            }

            if brand.is_none() {
                if let Some((first, rest)) = line1.split_once(' ') {
                    brand = Some(first.to_string());
                    let rest = rest.trim();
                    if !rest.is_empty() {
                        model = Some(rest.to_string());
                    }
                } else if self.known_brands.contains(&line1_lower) {
                    brand = Some(line1.to_string());
                } else {
                    model = Some(line1.to_string());
                }
            }
        }

        if let Some(line2) = line2 {
            let coincide = matches!(
                (&brand, &model),
                (Some(b), Some(m)) if b.eq_ignore_ascii_case(m)
            );
            if model.is_none() || coincide {
                model = Some(line2.to_string());
            }
        }

        (brand, model, full_title)
    }

    /// Value of the detail pair whose label matches `label`
    /// (case-insensitive). An emphasized sub-node wins over the plain value
    /// node; a literal "-" placeholder counts as absent.
    fn detail_value(&self, container: Option<&ElementRef>, label: &str) -> Option<String> {
        let container = container?;
        let label_lower = label.to_lowercase();

        for pair in container.select(&self.selectors.detail_pair) {
            let Some(label_element) = pair.select(&self.selectors.detail_label).next() else {
                continue;
            };
            let label_text = collect_text(&label_element).to_lowercase();
            if !label_text.contains(&label_lower) {
                continue;
            }

            let value = pair
                .select(&self.selectors.detail_value_emphasis)
                .next()
                .or_else(|| pair.select(&self.selectors.detail_value).next())
                .map(|el| collect_text(&el));

            return value.filter(|text| !text.is_empty() && text != "-");
        }
        None
    }

    fn text_of(&self, element: &ElementRef, selector: &Selector) -> Option<String> {
        element
            .select(selector)
            .next()
            .map(|el| collect_text(&el))
            .filter(|text| !text.is_empty())
    }
}

fn compile(selector: &str) -> ParsingResult<Selector> {
    Selector::parse(selector).map_err(|e| ParsingError::invalid_selector(selector, e))
}

fn collect_text(element: &ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Price and currency from the raw price-area text.
///
/// The literal "price on request" phrase maps to the sentinel with no
/// currency; otherwise a currency token and a numeric token are extracted
/// independently, and unparseable numeric text yields no price.
pub(crate) fn parse_price_currency(raw: Option<&str>) -> (Option<Price>, Option<String>) {
    let Some(raw) = raw else {
        return (None, None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return (None, None);
    }
    if trimmed.eq_ignore_ascii_case(PRICE_ON_REQUEST) {
        return (Some(Price::OnRequest), None);
    }

    let currency = CURRENCY_RE
        .find(trimmed)
        .map(|token| token.as_str().to_string());

    let price = AMOUNT_RE.find(trimmed).and_then(|token| {
        let cleaned = token.as_str().replace(',', "");
        match cleaned.parse::<f64>() {
            Ok(amount) => Some(Price::Amount(amount)),
            Err(_) => {
                warn!(raw = trimmed, "could not parse price");
                None
            }
        }
    });

    (price, currency)
}

/// Non-numeric production year text ("Unknown", ranges) counts as absent.
fn parse_year(raw: &str) -> Option<i32> {
    raw.trim().parse::<i32>().ok()
}
