//! chrono-harvester - Watch marketplace listing acquisition
//!
//! Scrapes product listings from a single target marketplace, normalizes
//! them into structured records, and persists them with dedup-aware
//! ("latest-wins") retrieval.

// Module declarations
pub mod domain;
pub mod infrastructure;
pub mod tools;
