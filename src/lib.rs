#![forbid(unsafe_code)]

//! Ingestion pipeline behind the tube-tracker backend: fetches channel and
//! playlist uploads, filters out Shorts, and streams the survivors to clients
//! batch by batch.

pub mod classifier;
pub mod config;
pub mod duration;
pub mod error;
pub mod pipeline;
pub mod prober;
pub mod resolver;
pub mod stream;
pub mod youtube;
