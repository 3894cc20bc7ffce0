pub mod chat;
pub mod completion;
pub mod config;
pub mod history;
pub mod models;
pub mod threads;
