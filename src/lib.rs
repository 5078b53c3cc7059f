pub mod auth;
pub mod cli;
pub mod config;
pub mod controller;
pub mod domain;
pub mod fetch;
pub mod filter;
pub mod inputter;
pub mod model;
pub mod record;
pub mod routes;
pub mod services;
pub mod store;
pub mod table;
pub mod ui;
pub mod views;
