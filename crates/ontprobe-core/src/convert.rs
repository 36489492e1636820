// ── Record → DeviceRecord conversions ──
//
// Field-extraction rules per topic. Each vendor names the same datum
// differently, so every rule lists its aliases in preference order.

use indexmap::IndexMap;
use tracing::debug;

use ontprobe_api::{NormalizedRecord, Topic, Value};

use crate::detect::repair_escaped_hyphen;
use crate::model::{DeviceRecord, LanPort, PhysicalSerialInfo, SerialSource, WifiBand, WifiNetwork};

const MODEL_KEYS: &[&str] = &["ModelName", "ProductModel", "ProductName", "DeviceName", "Model"];
const SERIAL_KEYS: &[&str] = &["SerialNumber", "SerialNo", "Serial"];
const HARDWARE_KEYS: &[&str] = &["HardwareVersion", "HardwareVer", "HWVer"];
const SOFTWARE_KEYS: &[&str] = &["SoftwareVersion", "SoftwareVer", "SWVer", "FirmwareVersion"];
const PHYSICAL_SERIAL_KEYS: &[&str] = &["gponsn", "GponSn", "PonSn"];
const MAC_KEYS: &[&str] = &["brmac", "MacAddress", "MACAddress"];
const MANUFACTURER_KEYS: &[&str] = &["Manufacturer"];

const TX_KEYS: &[&str] = &["txpower", "TxPower", "TXPower"];
const RX_KEYS: &[&str] = &["rxpower", "RxPower", "RXPower"];

const WAN_MAC_KEYS: &[&str] = &["WorkIFMac", "MacWan", "WanMac"];
const WAN_IP_KEYS: &[&str] = &["WanIp", "IPAddress", "ExternalIPAddress", "IpAddr"];
const WAN_TYPE_KEYS: &[&str] = &["WANAccessType", "WanAccessType", "TransType"];
const LAN_MAC_KEYS: &[&str] = &["MacLan", "LanMac"];

const USB_STATUS_KEYS: &[&str] = &["usb_status", "UsbStatus"];
const USB_PORT_KEYS: &[&str] = &["usb_port_num", "UsbPortNum"];

/// Apply a topic's record to the device. Returns `true` when at least
/// one field was recognised.
pub fn apply(topic: Topic, record: &NormalizedRecord, device: &mut DeviceRecord) -> bool {
    let found = match topic {
        Topic::Identity => apply_identity(record, device),
        Topic::Optics => apply_optics(record, device),
        Topic::Wan => apply_wan(record, device),
        Topic::Lan => apply_lan(record, device),
        Topic::Wifi => apply_wifi(record, device),
        Topic::Usb => apply_usb(record, device),
    };
    if !found {
        debug!(%topic, sections = record.sections.len(), "no recognised fields");
    }
    found
}

fn set_if_found(slot: &mut Option<String>, value: Option<String>) -> bool {
    match value {
        Some(v) => {
            *slot = Some(v);
            true
        }
        None => false,
    }
}

fn fill_if_empty(slot: &mut Option<String>, value: Option<String>) -> bool {
    if slot.is_some() {
        return false;
    }
    set_if_found(slot, value)
}

pub fn apply_identity(record: &NormalizedRecord, device: &mut DeviceRecord) -> bool {
    let mut found = false;
    found |= set_if_found(
        &mut device.model_name_raw,
        record.find_text(MODEL_KEYS).map(|m| repair_escaped_hyphen(&m)),
    );
    found |= set_if_found(&mut device.serial_logical, record.find_text(SERIAL_KEYS));
    found |= set_if_found(&mut device.hardware_version, record.find_text(HARDWARE_KEYS));
    found |= set_if_found(&mut device.software_version, record.find_text(SOFTWARE_KEYS));
    found |= set_if_found(&mut device.manufacturer, record.find_text(MANUFACTURER_KEYS));
    found |= set_if_found(&mut device.mac_address, record.find_text(MAC_KEYS));
    found |= fill_if_empty(&mut device.mac_wan, record.find_text(&["MacWan"]));
    found |= fill_if_empty(&mut device.mac_lan, record.find_text(LAN_MAC_KEYS));

    if let Some(physical) = record.find_text(PHYSICAL_SERIAL_KEYS) {
        device.serial_physical = Some(PhysicalSerialInfo {
            value: physical.to_uppercase(),
            source: SerialSource::Reported,
        });
        found = true;
    }
    found
}

/// Parse a power reading such as `-18.52`, `-18.52 dBm` or `3`.
pub fn parse_power(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let number = trimmed
        .strip_suffix("dBm")
        .or_else(|| trimmed.strip_suffix("dbm"))
        .unwrap_or(trimmed)
        .trim();
    number.parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn apply_optics(record: &NormalizedRecord, device: &mut DeviceRecord) -> bool {
    let tx = record.find_text(TX_KEYS).and_then(|v| parse_power(&v));
    let rx = record.find_text(RX_KEYS).and_then(|v| parse_power(&v));
    if tx.is_some() {
        device.tx_power_dbm = tx;
    }
    if rx.is_some() {
        device.rx_power_dbm = rx;
    }
    tx.is_some() || rx.is_some()
}

/// The always-on WAN connection, if the device lists several.
fn always_on_connection(record: &NormalizedRecord) -> Option<&IndexMap<String, Value>> {
    record.all_maps().into_iter().find(|m| {
        m.get("ConnTrigger")
            .and_then(Value::as_text)
            .is_some_and(|t| t.eq_ignore_ascii_case("AlwaysOn"))
    })
}

fn text_of(map: &IndexMap<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| map.get(*k).and_then(Value::as_text))
}

pub fn apply_wan(record: &NormalizedRecord, device: &mut DeviceRecord) -> bool {
    let preferred = always_on_connection(record);
    let mac = preferred
        .and_then(|m| text_of(m, WAN_MAC_KEYS))
        .or_else(|| record.find_text(WAN_MAC_KEYS));
    let ip = preferred
        .and_then(|m| text_of(m, WAN_IP_KEYS))
        .or_else(|| record.find_text(WAN_IP_KEYS));

    let mut found = false;
    found |= set_if_found(&mut device.mac_wan, mac);
    found |= set_if_found(&mut device.wan_ip, ip);
    found |= set_if_found(&mut device.wan_access_type, record.find_text(WAN_TYPE_KEYS));
    found
}

fn link_up(value: &Value) -> bool {
    match value {
        Value::Int(n) => *n == 1,
        Value::Text(t) => matches!(
            t.trim().to_lowercase().as_str(),
            "up" | "connected" | "link up" | "on"
        ),
        _ => false,
    }
}

pub fn apply_lan(record: &NormalizedRecord, device: &mut DeviceRecord) -> bool {
    let mut ports: Vec<LanPort> = record
        .all_maps()
        .into_iter()
        .flat_map(|m| m.iter())
        .filter_map(|(key, value)| {
            let index = key.strip_prefix("lan_status_")?.parse::<u8>().ok()?;
            Some(LanPort {
                index,
                link_up: link_up(value),
            })
        })
        .collect();
    ports.sort_by_key(|p| p.index);
    ports.dedup_by_key(|p| p.index);

    let mut found = !ports.is_empty();
    if found {
        device.lan_ports = ports;
    }
    found |= set_if_found(&mut device.mac_lan, record.find_text(LAN_MAC_KEYS));
    found
}

/// Depth-first search for a key anywhere in the tree.
fn find_nested<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match value {
        Value::Map(m) => m
            .get(key)
            .or_else(|| m.values().find_map(|v| find_nested(v, key))),
        Value::List(items) => items.iter().find_map(|v| find_nested(v, key)),
        _ => None,
    }
}

fn enabled_flag(map: &IndexMap<String, Value>, key: &str) -> Option<bool> {
    map.get(key).and_then(Value::as_i64).map(|n| n == 1)
}

fn upsert_network(networks: &mut Vec<WifiNetwork>, network: WifiNetwork) {
    let existing = networks
        .iter_mut()
        .find(|n| n.ssid == network.ssid && (n.band.is_none() || n.band == network.band));
    match existing {
        Some(current) => {
            current.band = current.band.or(network.band);
            current.enabled = current.enabled.or(network.enabled);
            if network.password.is_some() {
                current.password = network.password;
            }
        }
        None => networks.push(network),
    }
}

pub fn apply_wifi(record: &NormalizedRecord, device: &mut DeviceRecord) -> bool {
    let mut networks: Vec<WifiNetwork> = Vec::new();

    // Slot table: ssid1..4 on 2.4GHz, ssid5..8 on 5GHz.
    let slots = record
        .sections
        .values()
        .find_map(|v| find_nested(v, "wifi_obj_enable"))
        .and_then(Value::as_map);
    if let Some(slots) = slots {
        for n in 1..=8u8 {
            let Some(ssid) = slots.get(&format!("ssid{n}")).and_then(Value::as_text) else {
                continue;
            };
            upsert_network(
                &mut networks,
                WifiNetwork {
                    ssid,
                    band: Some(if n <= 4 { WifiBand::Band24 } else { WifiBand::Band5 }),
                    enabled: enabled_flag(slots, &format!("ConfigActive{n}")),
                    password: None,
                },
            );
        }
    }

    // Per-band detail sections carry the pre-shared key.
    for (name, value) in &record.sections {
        let band = if name.to_lowercase().contains("5g") {
            WifiBand::Band5
        } else {
            WifiBand::Band24
        };
        for map in value.maps() {
            let Some(ssid) = text_of(map, &["SSID"]) else {
                continue;
            };
            upsert_network(
                &mut networks,
                WifiNetwork {
                    ssid,
                    band: Some(band),
                    enabled: enabled_flag(map, "Enable"),
                    password: text_of(map, &["PreSharedKey", "KeyPassphrase"]),
                },
            );
        }
    }

    // Access-point lists; factory placeholder names are skipped and the
    // first two real entries map to 2.4GHz then 5GHz.
    if let Some(aps) = record.section("WLANAP") {
        let real = aps.maps().into_iter().filter_map(|m| {
            let ssid = text_of(m, &["ESSID"])?;
            (!ssid.to_uppercase().contains("SSID")).then_some((ssid, m))
        });
        for (position, (ssid, map)) in real.enumerate() {
            let band = match position {
                0 => Some(WifiBand::Band24),
                1 => Some(WifiBand::Band5),
                _ => None,
            };
            upsert_network(
                &mut networks,
                WifiNetwork {
                    ssid,
                    band,
                    enabled: enabled_flag(map, "Enable"),
                    password: text_of(map, &["KeyPassphrase", "PreSharedKey"]),
                },
            );
        }
    }

    if networks.is_empty() {
        return false;
    }
    device.wifi_networks = networks;
    true
}

pub fn apply_usb(record: &NormalizedRecord, device: &mut DeviceRecord) -> bool {
    if record.section("USBDEV").is_some() {
        device.usb_present = Some(true);
        return true;
    }

    let status = record
        .all_maps()
        .into_iter()
        .find_map(|m| USB_STATUS_KEYS.iter().find_map(|k| m.get(*k)));
    if let Some(status) = status {
        device.usb_present = Some(link_up(status));
        return true;
    }
    if record.find_text(USB_PORT_KEYS).is_some() {
        device.usb_present = Some(false);
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn record_from(sections: serde_json::Value) -> NormalizedRecord {
        let mut record = NormalizedRecord::default();
        if let Some(Value::Map(map)) = Value::from_json(&sections) {
            for (name, value) in map {
                record.insert(name, value);
            }
        }
        record
    }

    #[test]
    fn identity_prefers_first_alias_and_keeps_reported_serial() {
        let record = record_from(json!({
            "get_device_name": {"ModelName": "HG6145F"},
            "get_base_info": {
                "SerialNumber": "FHTT9E222B98",
                "gponsn": "464854549e222b98",
                "SoftwareVersion": "RP2740",
                "Manufacturer": "FiberHome"
            }
        }));
        let mut device = DeviceRecord::new("h");
        assert!(apply_identity(&record, &mut device));
        assert_eq!(device.model_name_raw.as_deref(), Some("HG6145F"));
        assert_eq!(device.serial_logical.as_deref(), Some("FHTT9E222B98"));
        assert_eq!(device.software_version.as_deref(), Some("RP2740"));
        assert_eq!(
            device.serial_physical,
            Some(PhysicalSerialInfo {
                value: "464854549E222B98".into(),
                source: SerialSource::Reported
            })
        );
    }

    #[test]
    fn power_readings_parse_with_units() {
        assert_eq!(parse_power("-18.52"), Some(-18.52));
        assert_eq!(parse_power(" 2.1 dBm"), Some(2.1));
        assert_eq!(parse_power("--"), None);
    }

    #[test]
    fn optics_only_set_when_present() {
        let mut device = DeviceRecord::new("h");
        let record = record_from(json!({"PON_OPTICALPARA": {"RxPower": "-19.4"}}));
        assert!(apply_optics(&record, &mut device));
        assert_eq!(device.rx_power_dbm, Some(-19.4));
        assert_eq!(device.tx_power_dbm, None);
    }

    #[test]
    fn wan_uses_always_on_connection() {
        let record = record_from(json!({"WAN_COMFIG": [
            {"ConnTrigger": "OnDemand", "WorkIFMac": "00:00:00:00:00:01"},
            {"ConnTrigger": "AlwaysOn", "WorkIFMac": "aa:bb:cc:dd:ee:ff", "IPAddress": "100.64.1.9"}
        ]}));
        let mut device = DeviceRecord::new("h");
        assert!(apply_wan(&record, &mut device));
        assert_eq!(device.mac_wan.as_deref(), Some("aa:bb:cc:dd:ee:ff"));
        assert_eq!(device.wan_ip.as_deref(), Some("100.64.1.9"));
    }

    #[test]
    fn lan_port_states() {
        let record = record_from(json!({"get_base_info": {
            "lan_status_2": "0", "lan_status_1": "1", "lan_status_3": "Up"
        }}));
        let mut device = DeviceRecord::new("h");
        assert!(apply_lan(&record, &mut device));
        assert_eq!(
            device.lan_ports,
            vec![
                LanPort { index: 1, link_up: true },
                LanPort { index: 2, link_up: false },
                LanPort { index: 3, link_up: true },
            ]
        );
    }

    #[test]
    fn wifi_slots_merge_with_band_details() {
        let record = record_from(json!({
            "get_allwan_info_broadBand": {"wifi_obj_enable": {
                "ssid1": "Casa", "ConfigActive1": "1",
                "ssid5": "Casa-5G", "ConfigActive5": "0"
            }},
            "get_wifi_info": {"SSID": "Casa", "PreSharedKey": "k24"},
            "get_5g_wifi_info": {"SSID": "Casa-5G", "PreSharedKey": "k5"}
        }));
        let mut device = DeviceRecord::new("h");
        assert!(apply_wifi(&record, &mut device));
        assert_eq!(
            device.wifi_networks,
            vec![
                WifiNetwork {
                    ssid: "Casa".into(),
                    band: Some(WifiBand::Band24),
                    enabled: Some(true),
                    password: Some("k24".into()),
                },
                WifiNetwork {
                    ssid: "Casa-5G".into(),
                    band: Some(WifiBand::Band5),
                    enabled: Some(false),
                    password: Some("k5".into()),
                },
            ]
        );
    }

    #[test]
    fn access_point_list_skips_placeholders() {
        let record = record_from(json!({"WLANAP": [
            {"ESSID": "SSID1"},
            {"ESSID": "Oficina", "Enable": 1},
            {"ESSID": "Oficina-5G"}
        ]}));
        let mut device = DeviceRecord::new("h");
        assert!(apply_wifi(&record, &mut device));
        let bands: Vec<_> = device.wifi_networks.iter().map(|n| (n.ssid.as_str(), n.band)).collect();
        assert_eq!(
            bands,
            vec![("Oficina", Some(WifiBand::Band24)), ("Oficina-5G", Some(WifiBand::Band5))]
        );
    }

    #[test]
    fn usb_presence() {
        let mut device = DeviceRecord::new("h");
        assert!(apply_usb(&record_from(json!({"USBDEV": {"Name": "sda"}})), &mut device));
        assert_eq!(device.usb_present, Some(true));

        let mut device = DeviceRecord::new("h");
        assert!(apply_usb(&record_from(json!({"get_base_info": {"usb_port_num": "1"}})), &mut device));
        assert_eq!(device.usb_present, Some(false));

        let mut device = DeviceRecord::new("h");
        assert!(!apply_usb(&NormalizedRecord::default(), &mut device));
        assert_eq!(device.usb_present, None);
    }
}
