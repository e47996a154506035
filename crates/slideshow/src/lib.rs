//! Display station of the photobooth: a touch slideshow that picks up new
//! pictures announced over the network.

pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod gesture;
pub mod ingest;
pub mod pictures;
pub mod screen;
