//! Data structures representing drone telemetry.
//!
//! This module defines the core types used throughout the crate to
//! represent signal measurements collected from a kismet server and the
//! batched messages handed to listeners.

use chrono::{DateTime, Utc};
use macaddr::MacAddr6;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// A single signal-strength observation reported by a kismet drone.
///
/// The drone is identified by its UUID, the observed device by its
/// EUI-48 hardware address.
///
/// # Example
///
/// A raw sentence like:
/// ```text
/// *CLISRC: 00:11:22:33:44:55 AA:BB:CC:DD:EE:FF 7c1e5200-0000-0000-0000-000000000001 1000 12 -42
/// ```
///
/// Would be parsed into a `MeasuredValue` with:
/// - `device_id`: AA:BB:CC:DD:EE:FF
/// - `drone_id`: 7c1e5200-0000-0000-0000-000000000001
/// - `signal_strength`: -42
/// - `timestamp`: 1000
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MeasuredValue {
    /// The extended unique identifier (EUI-48) of the observed device.
    pub device_id: MacAddr6,

    /// The unique identifier of the drone that made the observation.
    pub drone_id: Uuid,

    /// Signal strength in dBm.
    pub signal_strength: i32,

    /// The kismet server timestamp in seconds.
    pub timestamp: i64,
}

impl fmt::Display for MeasuredValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at {} dBm via {} @{}",
            self.device_id, self.signal_strength, self.drone_id, self.timestamp
        )
    }
}

/// A batch of telemetry collected between two cycle boundaries.
///
/// `drone_names` is a full-history snapshot: it contains every drone
/// seen on this connection up to the point the message was generated,
/// so it also catches drones added to the server at runtime.
/// `measured_values` contains only the observations received since the
/// previous message (or since connection start), in reception order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// The mapping of known drone UUIDs to their configured names.
    pub drone_names: HashMap<Uuid, String>,

    /// The measured values collected in this cycle, in reception order.
    pub measured_values: Vec<MeasuredValue>,

    /// The kismet server timestamp in seconds at the cycle boundary.
    pub timestamp: i64,
}

impl Message {
    /// The server timestamp as a UTC datetime.
    ///
    /// Returns `None` if the timestamp is outside the representable range.
    pub fn server_time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp, 0)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} measured values from {} known drones @{}",
            self.measured_values.len(),
            self.drone_names.len(),
            self.timestamp
        )
    }
}
