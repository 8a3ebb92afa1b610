//! # Marketplace payment gateway server
//!
//! This crate hosts the HTTP surface of the payment gateway. It is responsible for:
//! * Authenticated customer-facing payment routes (confirm, cancel, lookups).
//! * Receiving and verifying signed webhook notifications from the payment provider.
//! * The reqwest clients for the payment provider and the order/user/store services.
//!
//! ## Configuration
//! The server is configured via `MPG_`-prefixed environment variables. See [config] for more
//! information.
//!
//! ## Routes
//! * `GET /health`: liveness check, returns 200 OK.
//! * `POST /api/payments/confirm`: confirm (capture) a payment. JWT-authenticated.
//! * `PATCH /api/payments/cancel/{order_id}`: cancel an approved payment. JWT-authenticated.
//! * `GET /api/payments/order/{order_id}`: the payment for one of the caller's orders.
//! * `GET /api/payments/me`: all of the caller's payments.
//! * `POST /gateway/webhook`: provider status notifications, HMAC-signed.

pub mod auth;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod helpers;
pub mod integrations;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod webhook_routes;
