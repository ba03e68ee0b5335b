#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Portal report acquisition and warehouse ingestion.
//!
//! A run logs into the affiliate portal with a headless browser, exports
//! each report for the configured date range, converts the CSVs to
//! Parquet, and appends them to their warehouse tables. See
//! [`run::execute`].

pub mod config;
pub mod run;
