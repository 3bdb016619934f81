pub mod config;
pub mod credentials;
pub mod dropdex_toml;
pub mod logger;

pub use config::*;
pub use credentials::{Credentials, credentials_from_env, load_credentials};
pub use dropdex_toml::Settings;
pub use logger::{Colors, setup_logging};
