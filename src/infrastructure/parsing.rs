//! HTML extraction for marketplace listing pages.

pub mod error;
pub mod listing_parser;
pub mod selectors;

pub use error::{ParsingError, ParsingResult};
pub use listing_parser::ListingParser;
pub use selectors::ExtractionSelectors;
