// Public API for integration tests and potential library usage

pub mod abuse;
pub mod api;
pub mod auth;
pub mod broadcast;
pub mod config;
pub mod error;
pub mod hub;
pub mod protocol;
pub mod session;
pub mod state;
pub mod storage;
pub mod types;
pub mod ws;
