//! MQTT to Zabbix relay.
//!
//! Subscribes to MQTT topics and forwards every received value to Zabbix
//! trapper items using the Zabbix sender protocol.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │   MQTT Broker   │────>│      Relay      │────>│  Zabbix Server  │
//! │  (topics)       │     │ (topic -> keys) │     │  (trapper)      │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Topic mapping
//!
//! - A topic mapped to a string sends the whole payload to that item key.
//! - A topic mapped to an object decodes the payload as a JSON object and
//!   sends each listed field to its item key.
//!
//! ```json
//! {
//!   "topics": {
//!     "sensor/temp": "temp.key",
//!     "sensor/multi": {"t": "temp.key", "h": "hum.key"}
//!   }
//! }
//! ```
//!
//! # Usage
//!
//! ```bash
//! zabbix-mqtt-client --config config.json -v
//! ```
//!
//! See [`config::ClientConfig`] for configuration options.

pub mod args;
pub mod config;
pub mod mapping;
pub mod relay;
pub mod subscriber;

pub use args::ClientArgs;
pub use config::ClientConfig;
pub use mapping::{KeySpec, TopicMapping};
pub use relay::{MetricsSender, Relay, RelayStats, SubmitOutcome, translate, translate_detailed};
pub use subscriber::TopicSubscriber;
