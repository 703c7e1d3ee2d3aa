pub mod rest;
pub mod tls;

pub use rest::{create_rest_router, AppState};
