pub mod auth;
pub mod config;
pub mod coordinator;
pub mod faram;
pub mod logging;
pub mod notify;
pub mod request;
pub mod schema;
pub mod transport;
pub mod update;
