//! 1-Wire to MQTT bridge.
//!
//! This bridge polls 1-Wire sensors through owserver and publishes every
//! change of value to MQTT.
//!
//! # Topics and payloads
//!
//! Each sensor publishes on its configured `id`. Binary inputs (`"1"`/`"0"`)
//! become `OFF`/`ON` (swapped when `inverted`), presence sensors publish
//! `true`/`false`, anything else is published as read.
//!
//! # Modules
//!
//! - [`owserver`] - owserver network protocol client
//! - [`bus`] - Sensor bus abstraction and presence semantics
//! - [`tracker`] - Per-cycle change detection
//! - [`poller`] - Poll loop and payload mapping
//! - [`config`] - Bridge configuration

pub mod bus;
pub mod config;
pub mod owserver;
pub mod poller;
pub mod tracker;
