//! Execution contexts on either side of the bridge.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Wire name of the page-side context.
pub const PAGE_SCRIPT_NAME: &str = "PortalPageScript";
/// Wire name of the privileged content-script context.
pub const CONTENT_SCRIPT_NAME: &str = "PortalContentScript";

/// One side of the communicating pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContextId {
    /// The web page the application runs in.
    #[serde(rename = "PortalPageScript")]
    PageScript,
    /// The extension's content script.
    #[serde(rename = "PortalContentScript")]
    ContentScript,
}

impl ContextId {
    /// Wire name used in the envelope `target` field.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PageScript => PAGE_SCRIPT_NAME,
            Self::ContentScript => CONTENT_SCRIPT_NAME,
        }
    }

    /// The context on the other end of the channel.
    pub const fn remote(self) -> Self {
        match self {
            Self::PageScript => Self::ContentScript,
            Self::ContentScript => Self::PageScript,
        }
    }

    /// Parse a wire name. Anything other than the two known names is `None`.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            PAGE_SCRIPT_NAME => Some(Self::PageScript),
            CONTENT_SCRIPT_NAME => Some(Self::ContentScript),
            _ => None,
        }
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
