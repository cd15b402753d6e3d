use serde::{Deserialize, Serialize};
use std::{
    fmt::{self, Display},
    process,
    time::{SystemTime, UNIX_EPOCH},
};
use tracing::{error, warn};

/// Who wrote a reservation marker and when
///
/// Purely informational, the status of a case only ever depends on whether the marker exists.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct LockOwner {
    pub host: String,
    pub pid: u32,
    /// seconds since the unix epoch
    pub claimed_at: u64,
}

impl LockOwner {
    /// owner record for the running process
    pub fn current() -> Self {
        let host = match nix::unistd::gethostname() {
            Ok(hostname) => hostname.to_string_lossy().into_owned(),
            Err(error) => {
                error!(error = ?error, "Failed to retrieve hostname for lock owner: {error}");

                String::from("unknown")
            }
        };

        let claimed_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0);

        Self {
            host,
            pid: process::id(),
            claimed_at,
        }
    }

    /// read the owner back from marker contents, an empty marker has no owner
    pub fn parse(contents: &[u8]) -> Option<Self> {
        if contents.iter().all(u8::is_ascii_whitespace) {
            return None;
        }

        match serde_json::from_slice(contents) {
            Ok(owner) => Some(owner),
            Err(error) => {
                warn!(error = ?error, "Lock marker has unreadable contents, ignoring owner");

                None
            }
        }
    }
}

impl Display for LockOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (pid {}) at {}", self.host, self.pid, self.claimed_at)
    }
}
