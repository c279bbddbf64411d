//! homegate-client — HTTP implementation of the face and device services
//! used by the homegate scan loop.

pub mod api;
pub mod wire;

pub use api::{ApiClient, ApiConfig};
