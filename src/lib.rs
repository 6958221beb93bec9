//! Courier — relays notifications to Slack or an SMTP relay.

pub mod config;
pub mod error;
pub mod events;
pub mod notify;
pub mod routes;
