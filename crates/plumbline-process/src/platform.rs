//! Operating system capabilities, probed once per process lifetime.

use std::sync::OnceLock;
use tracing::debug;

/// What process control the host supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Children can be placed in their own process group.
    pub process_groups: bool,
}

static CAPABILITIES: OnceLock<Capabilities> = OnceLock::new();

/// Cached host capabilities.
pub fn capabilities() -> Capabilities {
    *CAPABILITIES.get_or_init(|| {
        let caps = Capabilities {
            process_groups: cfg!(unix),
        };
        debug!(?caps, "probed process capabilities");
        caps
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_are_stable() {
        assert_eq!(capabilities(), capabilities());
        #[cfg(unix)]
        assert!(capabilities().process_groups);
    }
}
