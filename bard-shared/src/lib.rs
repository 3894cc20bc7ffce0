#![cfg_attr(not(test), forbid(unsafe_code))]
#![warn(clippy::pedantic)]

//! Shared models, session identity, and configuration for the Bard chat client.

pub mod config;
pub mod models;
