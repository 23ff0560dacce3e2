//! Astro Data Archive access
//!
//! Looks up exposure files by raw name through the archive's advanced
//! search endpoint and downloads the matching flux, mask and weight files.

pub mod client;
pub mod error;
pub mod types;

pub use client::ArchiveClient;
pub use error::ArchiveError;
pub use types::{ArchiveRecord, ExposureFiles};
