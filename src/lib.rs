//! Patchwork: a patch-tracking service for projects that review changes on
//! mailing lists. This crate holds the store, the REST API and the CLI
//! plumbing behind the `patchwork` binary.

pub mod api;
pub mod config;
pub mod db;
pub mod diff;
pub mod errors;
pub mod headers;
pub mod logging;
pub mod models;
