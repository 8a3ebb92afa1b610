pub mod db;
mod store_impl;

pub use store_impl::SqlitePaymentStore;
