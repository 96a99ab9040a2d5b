use serde::{Deserialize, Serialize};
use std::fmt;

/// Release tracks of the monitored application, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Stable,
    Ptb,
    Canary,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Stable, Channel::Ptb, Channel::Canary];

    pub fn id(self) -> &'static str {
        match self {
            Channel::Stable => "stable",
            Channel::Ptb => "ptb",
            Channel::Canary => "canary",
        }
    }

    /// Relative endpoint serving this channel's current build metadata.
    pub fn endpoint(self) -> String {
        format!("api/{}.json", self.id())
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ReleaseRecord {
    pub release_channel: String,
    pub build_number: String,
    pub version_hash: String,
}
