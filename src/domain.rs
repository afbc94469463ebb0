//! Domain types for the listing pipeline.

pub mod listing;
pub mod protocol;

pub use listing::{ListingRecord, Price, PRICE_ON_REQUEST};
pub use protocol::{ResponseStatus, ToolRequest, ToolResponse};
