// ontprobe-api: HTTP, markup and UI-driver plumbing for ONT/ATA management interfaces

pub mod adapter;
pub mod auth;
pub mod client;
pub mod driver;
pub mod error;
pub mod normalize;
pub mod record;
pub mod session;
pub mod topic;
pub mod transport;

pub use adapter::{
    AjaxAdapter, AjaxMethod, AjaxTable, FieldPattern, HtmlAdapter, HtmlRoute, HtmlTable,
    ProtocolAdapter, XmlRoute, XmlUiAdapter, XmlUiTable,
};
pub use auth::{AuthMechanism, AuthOutcome, Credential};
pub use client::{DeviceClient, DeviceRequest, DeviceResponse};
pub use driver::{SelectorSet, UiClick, UiDriver, UiDriverLauncher, UiStep};
pub use error::{Error, FetchError};
pub use normalize::normalize;
pub use record::{ErrorBlock, NormalizedRecord, Value};
pub use session::{AdapterVariant, SessionContext, SessionToken};
pub use topic::Topic;
pub use transport::{TlsMode, TransportConfig};
