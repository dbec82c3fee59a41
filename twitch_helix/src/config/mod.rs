pub mod env;

pub use env::AuthConfig;
