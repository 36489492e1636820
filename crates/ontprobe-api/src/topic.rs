// ── Telemetry topics ──
//
// The fixed vocabulary every adapter answers to. Identity always runs
// first because model resolution and the serial transform depend on it.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Topic {
    Identity,
    Optics,
    Wan,
    Lan,
    Wifi,
    Usb,
}

impl Topic {
    /// Every topic, identity first.
    pub const ALL: [Topic; 6] = [
        Topic::Identity,
        Topic::Optics,
        Topic::Wan,
        Topic::Lan,
        Topic::Wifi,
        Topic::Usb,
    ];

    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn identity_leads_the_order() {
        assert_eq!(Topic::ALL[0], Topic::Identity);
    }

    #[test]
    fn parses_lowercase_names() {
        assert_eq!(Topic::from_str("wifi").ok(), Some(Topic::Wifi));
        assert_eq!(Topic::Optics.to_string(), "optics");
        assert!(Topic::from_str("voip").is_err());
    }
}
