// src/server/handlers/mod.rs
//! HTTP request handlers for the feed server

pub mod admin;
pub mod packages;
