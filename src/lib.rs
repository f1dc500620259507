//! Discord bot that turns chat messages into GitHub issues and comments.

pub mod classifier;
pub mod config;
pub mod discord;
pub mod engine;
pub mod model;
pub mod render;
pub mod request;
pub mod tools;
pub mod tracker;

pub use config::{Config, Policy};
pub use engine::{Bridge, IncomingRequest, RequestResult};
