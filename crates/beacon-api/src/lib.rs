pub mod error;
pub mod feeds;
pub mod messages;
pub mod middleware;
pub mod routes;
pub mod rules;
pub mod state;
pub mod values;

#[cfg(test)]
mod tests;

pub use error::{ApiError, ApiResult};
pub use routes::router;
pub use state::{AppState, AppStateInner};
