pub mod config;
pub mod dispatcher;
pub mod error;
pub mod publish;

pub use config::FederationConfig;
pub use dispatcher::{DeliveryOutcome, DispatchBatch, Dispatcher};
pub use error::FederationError;
pub use publish::federate;
