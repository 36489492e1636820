// ── UI automation driver ──
//
// The browser is an external collaborator. This module only names the
// capability the XML-over-UI adapter needs from it and the shape of the
// navigation steps it is asked to perform.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Error;

/// Ordered fallback selectors for one element; the first that matches wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorSet(pub Vec<String>);

impl SelectorSet {
    pub fn new<I, S>(selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(selectors.into_iter().map(Into::into).collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// One click inside a [`UiStep`]. Optional clicks may fail without
/// failing the step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiClick {
    pub selectors: SelectorSet,
    #[serde(default)]
    pub optional: bool,
}

impl UiClick {
    pub fn required(selectors: SelectorSet) -> Self {
        Self {
            selectors,
            optional: false,
        }
    }

    pub fn optional(selectors: SelectorSet) -> Self {
        Self {
            selectors,
            optional: true,
        }
    }
}

/// A named navigation step: return to the landing page, then click
/// through the listed elements in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiStep {
    pub name: String,
    pub clicks: Vec<UiClick>,
}

impl UiStep {
    pub fn new(name: impl Into<String>, clicks: Vec<UiClick>) -> Self {
        Self {
            name: name.into(),
            clicks,
        }
    }
}

/// Capability set of a remote browser session.
///
/// Implementations own the browser process; [`close`](Self::close) must
/// release it and be safe to call more than once.
#[async_trait]
pub trait UiDriver: Send + Sync {
    async fn navigate_to(&mut self, url: &Url) -> Result<(), Error>;

    /// Click the first element matched by `selectors`, waiting up to
    /// `within`. `Ok(false)` means nothing matched in time.
    async fn click_element(&mut self, selectors: &SelectorSet, within: Duration)
    -> Result<bool, Error>;

    /// Type `value` into the first matched input. `Ok(false)` when absent.
    async fn fill_field(
        &mut self,
        selectors: &SelectorSet,
        value: &str,
        within: Duration,
    ) -> Result<bool, Error>;

    async fn current_page_source(&mut self) -> Result<String, Error>;

    async fn get_cookies(&mut self) -> Result<Vec<(String, String)>, Error>;

    async fn close(&mut self) -> Result<(), Error>;
}

/// Starts browser sessions on demand.
#[async_trait]
pub trait UiDriverLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn UiDriver>, Error>;
}
