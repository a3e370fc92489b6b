//! # IMU Bridge Library
//!
//! Serve gyroscope-integrated device orientation over a plain-text HTTP endpoint.
//!
//! This library provides the core functionality: integrating angular-velocity
//! samples into a bounded 3-axis angle state, and a telemetry server that
//! answers one-letter path commands with the latest snapshot.

pub mod config;
pub mod error;
pub mod orientation;
pub mod sensor;
pub mod server;
pub mod service;
