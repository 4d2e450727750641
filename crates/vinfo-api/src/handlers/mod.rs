//! HTTP handlers for vinfo-api.

pub mod health;
pub mod info;
