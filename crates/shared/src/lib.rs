//! Types shared between the roster server and the dashboard client.

pub mod fields;
pub mod metrics;
pub mod models;
pub mod timestamp;

pub use models::*;
