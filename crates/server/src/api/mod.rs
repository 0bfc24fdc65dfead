pub mod batches;
pub mod deliveries;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod middleware;
pub mod queues;
pub mod routes;
pub mod tokens;

pub use error::{ApiError, ErrorResponse};
pub use routes::create_router;
