// src/mcp/mod.rs

pub mod dispatcher;
pub mod handler;
pub mod protocol;
pub mod resources;
pub mod stdio;
pub mod tools;
