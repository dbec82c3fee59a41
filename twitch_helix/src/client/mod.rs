pub mod api;

pub use api::{HandleScope, HelixClient, HelixUser};
