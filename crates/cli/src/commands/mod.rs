pub mod chat;
pub mod code;
pub mod config_cmd;
pub mod models;
