pub mod api;
pub mod hasher;
pub mod models;
