pub mod adapters;
pub mod budget;
pub mod credentials;
pub mod error;
pub mod gateway;
pub mod reliability;
pub mod request_normalizer;
pub mod router;
pub mod telemetry;
pub mod types;

pub use gateway::AIGateway;
