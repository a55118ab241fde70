#![forbid(unsafe_code)]
#![deny(clippy::float_arithmetic)]
#![deny(clippy::float_cmp)]

pub mod claim_api;
pub mod config;
pub mod http_server;
pub mod issuance_limit;
pub mod logging;
pub mod metrics;
pub mod verify;
