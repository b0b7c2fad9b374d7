pub mod artifact;
pub mod config;
pub mod error;
pub mod findings;
pub mod generation;
pub mod merge;
pub mod reconcile;
pub mod report;
pub mod review;
pub mod risk;
pub mod session;
pub mod taxonomy;
pub mod workflow;

pub use error::{Result, WaReviewError};

