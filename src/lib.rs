//! Efika Corretora site backend: chat lead capture, access gate, and back office.

pub mod access;
pub mod auth;
pub mod chatbot;
pub mod config;
pub mod error;
pub mod leads;
pub mod server;
pub mod store;
