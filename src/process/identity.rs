//! Per-process instance identity.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use url::Url;
use uuid::Uuid;

/// Immutable identity of one process unit, used for log correlation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceIdentity {
    instance_id: Uuid,
    canonical_url: Url,
    started_at: SystemTime,
}

impl InstanceIdentity {
    /// Generate a fresh identity stamped with the current time.
    pub fn new(canonical_url: Url) -> Self {
        Self {
            instance_id: Uuid::new_v4(),
            canonical_url,
            started_at: SystemTime::now(),
        }
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn canonical_url(&self) -> &Url {
        &self.canonical_url
    }

    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    /// Startup timestamp as milliseconds since the Unix epoch.
    pub fn started_at_unix_ms(&self) -> u64 {
        self.started_at
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identities_are_unique() {
        let url = Url::parse("https://svc.example.com").unwrap();
        let a = InstanceIdentity::new(url.clone());
        let b = InstanceIdentity::new(url);
        assert_ne!(a.instance_id(), b.instance_id());
        assert_eq!(a.canonical_url(), b.canonical_url());
        assert!(a.started_at_unix_ms() > 0);
    }
}
