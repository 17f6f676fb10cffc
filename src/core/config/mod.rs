pub mod defaults;
pub mod paths;
pub mod schema;
pub mod service;
pub mod validation;

pub use paths::AppPaths;
pub use schema::{AppConfig, ServerConfig};
pub use service::ConfigService;
