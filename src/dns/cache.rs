//! TTL-bounded name cache.

use std::cell::RefCell;
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

struct Entry {
    addrs: Vec<IpAddr>,
    expires: Instant,
}

/// Answers remembered until their TTL runs out.
#[derive(Default)]
pub(crate) struct DnsCache {
    entries: RefCell<HashMap<String, Entry>>,
}

impl DnsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unexpired addresses for `name`. Expired entries are evicted on
    /// the way.
    pub fn get(&self, name: &str) -> Option<Vec<IpAddr>> {
        let mut entries = self.entries.borrow_mut();
        match entries.get(name) {
            Some(entry) if entry.expires > Instant::now() => Some(entry.addrs.clone()),
            Some(_) => {
                entries.remove(name);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, name: &str, addrs: Vec<IpAddr>, ttl: Duration) {
        self.entries.borrow_mut().insert(
            name.to_string(),
            Entry {
                addrs,
                expires: Instant::now() + ttl,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn hit_until_expiry() {
        let cache = DnsCache::new();
        let addr = IpAddr::V4(Ipv4Addr::LOCALHOST);
        cache.put("host.test", vec![addr], Duration::from_secs(60));
        assert_eq!(cache.get("host.test"), Some(vec![addr]));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn expired_entries_evict() {
        let cache = DnsCache::new();
        cache.put(
            "gone.test",
            vec![IpAddr::V4(Ipv4Addr::LOCALHOST)],
            Duration::ZERO,
        );
        assert_eq!(cache.get("gone.test"), None);
        assert_eq!(cache.len(), 0);
    }
}
