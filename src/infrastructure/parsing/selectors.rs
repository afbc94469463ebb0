//! CSS selectors for the target marketplace's search-result markup.

use serde::{Deserialize, Serialize};

/// Selector strings for the pieces of one listing element.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionSelectors {
    /// One element per listing on the search-result page
    pub listing_container: String,

    /// Anchor carrying the listing URL
    pub listing_link: String,

    /// First title line (usually the brand)
    pub primary_title: String,

    /// Second title line (usually the model)
    pub secondary_title: String,

    /// Text node holding the price and currency
    pub price_area: String,

    /// Container of the label/value detail pairs
    pub details_container: String,

    /// One label/value pair inside the details container
    pub detail_pair: String,

    /// Label node within a pair
    pub detail_label: String,

    /// Value node within a pair
    pub detail_value: String,

    /// Emphasized value sub-node, preferred over the plain value node
    pub detail_value_emphasis: String,
}

impl Default for ExtractionSelectors {
    fn default() -> Self {
        Self {
            listing_container: "div.js-article-item-container".to_string(),
            listing_link: "a.js-article-item.article-item".to_string(),
            primary_title: "div.text-sm.text-bold.text-ellipsis".to_string(),
            secondary_title: "div.text-sm.text-ellipsis.m-b-sm-2".to_string(),
            price_area: "div.text-lg.text-sm-xlg.text-bold".to_string(),
            details_container: "div.d-sm-flex.m-b-sm-3.flex-wrap".to_string(),
            detail_pair: "div.w-50.row.row-direct".to_string(),
            detail_label: "div.col-xs-12:not(.text-ellipsis)".to_string(),
            detail_value: "div.col-xs-12.text-ellipsis".to_string(),
            detail_value_emphasis: "div.col-xs-12.text-ellipsis strong".to_string(),
        }
    }
}

/// Detail-pair labels the extraction engine looks for.
pub mod labels {
    pub const MOVEMENT: &str = "Movement";
    pub const CASE_MATERIAL: &str = "Case material";
    pub const YEAR_OF_PRODUCTION: &str = "Year of production";
    pub const CONDITION: &str = "Condition";
    pub const LOCATION: &str = "Location";
    pub const REFERENCE_NUMBER: &str = "Reference number";
}
