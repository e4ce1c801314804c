pub mod auth;
pub mod chat;
pub mod quiz;
pub mod runs;
