pub mod audit;
pub mod config;
pub mod db;
pub mod dto;
pub mod email;
pub mod entity;
pub mod error;
pub mod extract;
pub mod models;
pub mod payments;
pub mod rate_limit;
pub mod response;
pub mod routes;
pub mod security;
pub mod services;
pub mod state;
pub mod store;
pub mod testing;
pub mod validation;
