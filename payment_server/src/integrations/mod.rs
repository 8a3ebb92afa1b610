//! Concrete HTTP clients for the engine's collaborator traits.
//!
//! Each client wraps a `reqwest::Client` and implements the corresponding trait from
//! `payment_engine`. The engine only ever sees the trait objects, so tests swap these for
//! mocks.

mod gateway;
mod orders;
mod stores;
mod users;

pub use gateway::GatewayClient;
pub use orders::OrderServiceClient;
pub use stores::StoreDirectoryClient;
pub use users::UserDirectoryClient;
