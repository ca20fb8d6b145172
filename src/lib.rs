//! # rusty-sleep
//!
//! Classical and Bayesian linear regression of mammal sleep hours on log
//! brain weight, with per-observation posterior summaries.
//!
//! - [`data`]: typed mammal records, loaders, filters, export
//! - [`stats`]: observation tables, OLS, Gibbs sampler, draw summarizer
//! - [`analysis`]: configuration and the end-to-end pipeline

pub mod analysis;
pub mod data;
pub mod stats;
