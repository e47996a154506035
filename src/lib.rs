//! Capture station of the photobooth: buttons, countdown, camera and the
//! hand-off of new pictures to the slideshow station.

pub mod camera;
pub mod config;
pub mod error;
pub mod events;
pub mod hardware;
pub mod peripherals;
pub mod tasks {
    pub mod capture;
    pub mod distribution;
}
