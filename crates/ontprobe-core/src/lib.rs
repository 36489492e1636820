// ── ontprobe-core ──
//
// Session trial, model resolution, serial derivation and topic
// aggregation on top of the protocol adapters in `ontprobe-api`.

pub mod aggregator;
pub mod backend;
pub mod config;
pub mod convert;
pub mod detect;
pub mod error;
pub mod model;
pub mod prober;
pub mod resolver;
pub mod serial;
pub mod session;

pub use aggregator::Aggregator;
pub use backend::{AdapterFactory, HttpAdapterFactory, LandingPage};
pub use config::{CredentialBook, ProbeConfig};
pub use detect::{DeviceFamily, Detection, classify_landing_page};
pub use error::CoreError;
pub use model::{
    Confidence, DeviceRecord, Finding, LanPort, PhysicalSerialInfo, SerialSource, TopicStatus,
    WifiAssessment, WifiBand, WifiNetwork,
};
pub use prober::{ProbeReport, Prober};
pub use resolver::{ModelEntry, ModelMappingTable, UNKNOWN_PREFIX};
pub use serial::PhysicalSerial;
pub use session::{AuthAttempt, EstablishedSession, SessionMachine, SessionState};
