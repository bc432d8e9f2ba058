//! API models for requests and responses

pub mod api;

pub use api::*;
