//! hivebridge: a resilient smart-home event bridge.
//!
//! Reads the Hue bridge's server-sent event stream and republishes every
//! update to an MQTT broker: the raw bundle on `{prefix}/raw` and each
//! resource on `{prefix}/{type}/{id}`. Both sides reconnect on their own
//! with a fixed delay, so the daemon rides out broker restarts and bridge
//! reboots without operator attention.
//!
//! The MQTT transport lives in the `hivebridge-mqtt` crate; this crate adds
//! the SSE reader, the republish relay, configuration, and logging.

pub mod config;
pub mod core;
pub mod logger;
