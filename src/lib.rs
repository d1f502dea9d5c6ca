// Library exports for the forum server
// This allows integration tests and external code to use forum modules

pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod repository;
pub mod routes;
pub mod service;
pub mod state;
pub mod validation;
pub mod vote;
