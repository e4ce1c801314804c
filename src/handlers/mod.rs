// src/handlers/mod.rs
pub mod auth;
pub mod gemini;
pub mod runs;
pub mod status;
pub mod upload;
