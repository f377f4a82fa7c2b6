pub mod blend;
pub mod catalog;
pub mod catalog_client;
pub mod cli;
pub mod config;
pub mod material;
pub mod profile;
