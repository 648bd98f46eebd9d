pub mod app_state;
pub mod authentication;
pub mod broadcast_client;
pub mod cache;
pub mod configuration;
pub mod domain;
pub mod email_client;
pub mod errors;
pub mod repository;
pub mod routes;
pub mod services;
pub mod startup;
pub mod storage;
pub mod telemetry;
