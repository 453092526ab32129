pub mod gateway;
pub mod repositories;

pub use gateway::{GatewayClient, GatewaySlot, Query};
pub use repositories::RepositoryError;
