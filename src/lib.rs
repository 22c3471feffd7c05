pub mod auth;
pub mod booking;
pub mod chat;
pub mod db;
pub mod error;
pub mod models;
pub mod pricing;
pub mod routes;
pub mod schedule;
pub mod state;
