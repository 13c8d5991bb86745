//! API handlers module

pub mod audio;
pub mod chat;
pub mod health;
