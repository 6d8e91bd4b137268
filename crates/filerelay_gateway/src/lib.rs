pub mod app;
pub mod error;

pub use app::{build_router, AppState, GatewayConfig, API_KEY_HEADER};
pub use error::GatewayError;
