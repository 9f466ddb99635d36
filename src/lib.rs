pub mod app;
pub mod auth;
pub mod categories;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod health;
pub mod mail;
pub mod memory;
pub mod questions;
pub mod response;
pub mod state;
pub mod upload;
pub mod users;
