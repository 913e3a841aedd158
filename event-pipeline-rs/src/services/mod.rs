//! Transports to external generative services

pub mod openai;
mod common;

pub use common::UserAgent;
