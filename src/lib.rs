//! Records SEPTA TransitView vehicle positions into a database

pub mod config;
pub mod errors;
pub mod feed;
pub mod models;
pub mod poller;
pub mod store;
