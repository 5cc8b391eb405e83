//! HTTP endpoint handlers. Analysis work runs on the blocking pool.

pub mod analyze;
pub mod capture;
pub mod health;
