// ── Canonical device model ──
//
// What a probe run produces. Built incrementally by the aggregator and
// handed to reporting untouched afterwards.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ontprobe_api::{AdapterVariant, AuthMechanism, Topic};

use crate::detect::DeviceFamily;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SerialSource {
    /// Reported by the device itself.
    Reported,
    /// Computed from the logical serial.
    Derived,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalSerialInfo {
    pub value: String,
    pub source: SerialSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WifiBand {
    #[serde(rename = "2.4GHz")]
    Band24,
    #[serde(rename = "5GHz")]
    Band5,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiNetwork {
    pub ssid: String,
    pub band: Option<WifiBand>,
    pub enabled: Option<bool>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// Backed by data read from the device.
    Verified,
    /// Assumed from indirect evidence; treat as a hint.
    Inferred,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiAssessment {
    pub working: bool,
    pub confidence: Confidence,
    pub basis: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanPort {
    pub index: u8,
    pub link_up: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TopicStatus {
    Pending,
    Fetched,
    Failed { reason: String },
    NotSupported,
    Cancelled,
}

impl TopicStatus {
    pub fn is_fetched(&self) -> bool {
        matches!(self, Self::Fetched)
    }
}

/// Something that went wrong (or could not be determined) during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Finding {
    AuthenticationFailed { attempts: usize },
    TopicFetchFailed { topic: Topic, reason: String },
    UnresolvedModel { raw: String },
    UndeterminableSerialTransform { serial: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub host: String,
    pub family: Option<DeviceFamily>,
    pub variant: Option<AdapterVariant>,
    pub mechanism: Option<AuthMechanism>,
    pub username: Option<String>,

    // ── Identity ──
    pub model_code: Option<String>,
    pub model_name_raw: Option<String>,
    pub model_display_name: Option<String>,
    pub model_hint: Option<String>,
    pub manufacturer: Option<String>,
    pub serial_logical: Option<String>,
    pub serial_physical: Option<PhysicalSerialInfo>,
    pub serial_physical_display: Option<String>,
    pub hardware_version: Option<String>,
    pub software_version: Option<String>,
    pub mac_address: Option<String>,

    // ── Optics ──
    pub tx_power_dbm: Option<f64>,
    pub rx_power_dbm: Option<f64>,

    // ── WAN / LAN ──
    pub mac_wan: Option<String>,
    pub wan_ip: Option<String>,
    pub wan_access_type: Option<String>,
    pub mac_lan: Option<String>,
    pub lan_ports: Vec<LanPort>,

    // ── WiFi / USB ──
    pub wifi_networks: Vec<WifiNetwork>,
    pub wifi_assessment: Option<WifiAssessment>,
    pub usb_present: Option<bool>,

    pub topics: BTreeMap<Topic, TopicStatus>,
    pub probed_at: DateTime<Utc>,
}

impl DeviceRecord {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            family: None,
            variant: None,
            mechanism: None,
            username: None,
            model_code: None,
            model_name_raw: None,
            model_display_name: None,
            model_hint: None,
            manufacturer: None,
            serial_logical: None,
            serial_physical: None,
            serial_physical_display: None,
            hardware_version: None,
            software_version: None,
            mac_address: None,
            tx_power_dbm: None,
            rx_power_dbm: None,
            mac_wan: None,
            wan_ip: None,
            wan_access_type: None,
            mac_lan: None,
            lan_ports: Vec::new(),
            wifi_networks: Vec::new(),
            wifi_assessment: None,
            usb_present: None,
            topics: BTreeMap::new(),
            probed_at: Utc::now(),
        }
    }

    pub fn topic_status(&self, topic: Topic) -> Option<&TopicStatus> {
        self.topics.get(&topic)
    }
}
