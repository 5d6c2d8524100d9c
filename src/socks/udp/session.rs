//! Per-association record of client source addresses
//!
//! The first datagram from a source address claims it; every later one
//! from the same address finds it already present. Entries live as long
//! as the association.

use dashmap::DashSet;
use std::net::SocketAddr;

/// Set of client source addresses that already have a return path
#[derive(Debug, Default)]
pub struct SessionTable {
    seen: DashSet<String>,
}

impl SessionTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically record `source`; `true` only for the first caller
    pub fn insert_if_absent(&self, source: &SocketAddr) -> bool {
        self.seen.insert(source.to_string())
    }

    /// Number of distinct sources recorded
    pub(crate) fn len(&self) -> usize {
        self.seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn source(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn test_first_insert_wins() {
        let table = SessionTable::new();
        assert_eq!(table.len(), 0);

        assert!(table.insert_if_absent(&source(5000)));
        assert!(!table.insert_if_absent(&source(5000)));
        assert!(table.insert_if_absent(&source(5001)));
        assert!(!table.insert_if_absent(&source(5001)));

        assert_eq!(table.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_inserts_claim_each_source_once() {
        const SOURCES: u16 = 32;
        const REPEATS: usize = 8;

        let table = Arc::new(SessionTable::new());
        let claimed = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..REPEATS {
            for port in 0..SOURCES {
                let table = table.clone();
                let claimed = claimed.clone();
                handles.push(tokio::spawn(async move {
                    if table.insert_if_absent(&source(6000 + port)) {
                        claimed.fetch_add(1, Ordering::SeqCst);
                    }
                }));
            }
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(claimed.load(Ordering::SeqCst), SOURCES as usize);
        assert_eq!(table.len(), SOURCES as usize);
    }
}
