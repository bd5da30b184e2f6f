pub mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod email;
pub mod organizations;
pub mod state;
