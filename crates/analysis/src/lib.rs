//! Client for the external sneaker-analysis inference service.
//!
//! The service is slow (seconds to minutes) and its response shape is not
//! contractually guaranteed field-by-field, so this crate is the trust
//! boundary: [`client::AnalysisClient`] enforces a hard timeout and
//! classifies every failure as retryable or unrecoverable, and
//! [`normalize`] coerces the loose wire shapes into the canonical
//! `{value, confidence}` form before anything downstream sees them.

pub mod client;
pub mod normalize;

pub use client::{AnalysisClient, AnalysisConfig, AnalysisError, AnalysisService};
pub use normalize::{AiField, AiMetadata, Analysis};
