// Application layer - use cases over the injected stores

pub mod error;
pub mod service;

pub use error::*;
pub use service::*;
