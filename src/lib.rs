#![allow(clippy::enum_variant_names)]

pub mod application;
pub mod assistant;
pub mod cli;
pub mod config;
pub mod filesystem;
pub mod project;
pub mod sandbox;
pub mod workspace;
