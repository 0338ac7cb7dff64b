//! Data models for carscan-ai

pub mod analysis;

pub use analysis::{Analysis, AnalysisPage, AnalysisStatistics};
