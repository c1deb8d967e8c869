mod error;
pub mod fallback;
mod gateway;
mod raw;
pub mod routes;

pub use error::{ApiError, CONNECTIVITY_FAILURE, GENERIC_FAILURE};
pub use fallback::FallbackPolicy;
pub use gateway::Gateway;
pub use raw::RawSubmitter;
