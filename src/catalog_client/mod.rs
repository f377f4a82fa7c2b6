pub mod connection;
pub mod endpoints;

pub use connection::{CatalogClient, CatalogClientError};
pub use endpoints::RetryPolicy;
