//! HTTP front-end for the analysis pipeline.
//!
//! Thin layer: request parsing, upload staging and status mapping. All
//! decisions about the leaf live in `pipeline::analysis`.

pub mod endpoints;
pub mod error;
pub mod router;
pub mod server;
pub mod types;

pub use router::build_router;
pub use server::{start_server, AnalysisServer};
pub use types::ApiContext;
