pub mod connection;
pub mod fixtures;
pub mod gateway;
pub mod migrations;

pub use connection::{connect, connect_with_settings, DbPool};
pub use fixtures::{SeedError, SeedResult, VerificationResult, WorkshopSeed};
pub use gateway::SqlDataGateway;
