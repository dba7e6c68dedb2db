pub mod catalog;
pub mod config;
pub mod credential;
pub mod error;
pub mod job;
pub mod poller;
pub mod provider;
