//! REST API for patches.
//!
//! | Route                              | Methods                  |
//! |------------------------------------|--------------------------|
//! | `/api/[{version}/]`                | GET                      |
//! | `/api/[{version}/]patches/`        | GET (POST/PUT/DELETE 405)|
//! | `/api/[{version}/]patches/{id}/`   | GET, PATCH (others 405)  |
//!
//! Supported versions are `1.0` and `1.1`; the unversioned routes serve
//! the current version.

pub mod auth;
pub mod error;
pub mod filters;
pub mod handlers;
pub mod pagination;
pub mod serializers;
pub mod server;
pub mod version;
