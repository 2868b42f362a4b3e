pub mod auth;
pub mod body;
pub mod server;

pub use auth::AuthCaller;
pub use body::ApiJson;
pub use server::{AppState, HttpServer, HttpServerConfig};
