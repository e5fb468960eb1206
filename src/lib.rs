//! Backend for the agent console: follows thread event streams and folds
//! them into display transcripts, invokes agents, and serves both over HTTP.

pub mod cache;
pub mod chat;
pub mod config;
pub mod errors;
pub mod hub;
pub mod invoke;
pub mod messages;
pub mod models;
pub mod routes;
pub mod service;
pub mod session;
pub mod source;
pub mod transcript;
