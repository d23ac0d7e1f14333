//! Transport-level connection tracking for the session server
//!
//! This module maps datagram peers to engine connection ids:
//! - Connection lifecycle (first datagram, explicit leave, timeout)
//! - Liveness tracking from heartbeats and any other traffic
//! - Capacity limits on concurrent peers
//!
//! The engine never sees socket addresses; it only knows connection ids.
//! The table is the single place where the two are translated.

use log::info;
use shared::ConnectionId;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// One remote peer known to the server
#[derive(Debug)]
pub struct Connection {
    /// Engine-facing identifier, never reused while the server runs
    pub id: ConnectionId,
    /// Where replies for this connection are sent
    pub addr: SocketAddr,
    /// Last time any datagram arrived from this peer
    pub last_seen: Instant,
}

impl Connection {
    pub fn new(id: ConnectionId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
        }
    }

    /// Returns true if nothing was heard from the peer within `timeout`.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// All peers currently talking to the server
///
/// Ids start at 1 and only ever grow, so a late message addressed to a
/// dropped connection can never reach whoever took over its address.
pub struct ConnectionTable {
    connections: HashMap<ConnectionId, Connection>,
    next_id: ConnectionId,
    max_connections: usize,
}

impl ConnectionTable {
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: HashMap::new(),
            next_id: 1,
            max_connections,
        }
    }

    /// Returns the connection id for `addr`, registering the peer on first
    /// contact. `None` when the server is at capacity.
    pub fn connect(&mut self, addr: SocketAddr) -> Option<ConnectionId> {
        if let Some(id) = self.find_by_addr(addr) {
            self.touch(id);
            return Some(id);
        }
        if self.connections.len() >= self.max_connections {
            return None;
        }

        let id = self.next_id;
        self.next_id += 1;
        info!("Connection {} opened from {}", id, addr);
        self.connections.insert(id, Connection::new(id, addr));
        Some(id)
    }

    /// Marks the connection as alive.
    pub fn touch(&mut self, id: ConnectionId) -> bool {
        match self.connections.get_mut(&id) {
            Some(connection) => {
                connection.last_seen = Instant::now();
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: ConnectionId) -> bool {
        if let Some(connection) = self.connections.remove(&id) {
            info!("Connection {} from {} closed", id, connection.addr);
            true
        } else {
            false
        }
    }

    pub fn find_by_addr(&self, addr: SocketAddr) -> Option<ConnectionId> {
        self.connections
            .values()
            .find(|connection| connection.addr == addr)
            .map(|connection| connection.id)
    }

    pub fn addr_of(&self, id: ConnectionId) -> Option<SocketAddr> {
        self.connections.get(&id).map(|connection| connection.addr)
    }

    /// Drops every silent peer and returns their ids so the engine can
    /// start their grace periods.
    pub fn check_timeouts(&mut self, timeout: Duration) -> Vec<ConnectionId> {
        let timed_out: Vec<ConnectionId> = self
            .connections
            .values()
            .filter(|connection| connection.is_timed_out(timeout))
            .map(|connection| connection.id)
            .collect();

        for id in &timed_out {
            info!("Connection {} timed out", id);
            self.connections.remove(id);
        }
        timed_out
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), port)
    }

    #[test]
    fn test_connect_assigns_increasing_ids() {
        let mut table = ConnectionTable::new(4);
        assert_eq!(table.connect(addr(8001)), Some(1));
        assert_eq!(table.connect(addr(8002)), Some(2));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_same_address_keeps_its_id() {
        let mut table = ConnectionTable::new(4);
        let first = table.connect(addr(8001));
        assert_eq!(table.connect(addr(8001)), first);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_capacity_limit() {
        let mut table = ConnectionTable::new(1);
        assert!(table.connect(addr(8001)).is_some());
        assert!(table.connect(addr(8002)).is_none());
    }

    #[test]
    fn test_ids_not_reused_after_remove() {
        let mut table = ConnectionTable::new(4);
        let id = table.connect(addr(8001)).unwrap();
        assert!(table.remove(id));
        assert!(!table.remove(id));
        assert_eq!(table.connect(addr(8001)), Some(id + 1));
    }

    #[test]
    fn test_lookup_both_ways() {
        let mut table = ConnectionTable::new(4);
        let id = table.connect(addr(8005)).unwrap();
        assert_eq!(table.find_by_addr(addr(8005)), Some(id));
        assert_eq!(table.addr_of(id), Some(addr(8005)));
        assert_eq!(table.addr_of(99), None);
    }

    #[test]
    fn test_check_timeouts() {
        let mut table = ConnectionTable::new(4);
        let id = table.connect(addr(8001)).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert!(table.check_timeouts(Duration::from_secs(5)).is_empty());

        let timed_out = table.check_timeouts(Duration::from_millis(5));
        assert_eq!(timed_out, vec![id]);
        assert!(table.is_empty());
    }
}
