pub mod autofill;
pub mod classifier;
pub mod config;
pub mod dataset;
pub mod db;
pub mod embedding;
pub mod error;
pub mod fuzzy_matcher;
pub mod llm;
pub mod merge;
pub mod noise;
pub mod pipeline;
pub mod review;
pub mod standardize;

pub use config::{AiLevel, Config};
pub use error::{CorplinkError, Result};
