//! REST boundary: typed client for the dashboard API

pub mod client;

pub use client::ApiClient;
