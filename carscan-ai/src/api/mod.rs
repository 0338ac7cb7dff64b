//! HTTP API handlers for carscan-ai

pub mod analyze;
pub mod health;
pub mod history;
pub mod statistics;

pub use analyze::analyze_routes;
pub use health::health_routes;
pub use history::history_routes;
pub use statistics::statistics_routes;
