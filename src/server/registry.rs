//! Readiness registry: the set of handles the reactor watches.
//!
//! A fixed-capacity bitmap answers "is this handle watched" with one word
//! test. A side table maps every client handle to its peer address. The
//! listening handle is watched without an address.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;

use thiserror::Error;

const WORD_BITS: usize = u64::BITS as usize;

/// Opaque identifier of a listening socket or an accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(pub usize);

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("handle {handle} exceeds registry capacity {capacity}")]
    CapacityExceeded { handle: Handle, capacity: usize },
}

#[derive(Debug, Clone)]
pub struct ReadinessRegistry {
    bits: Vec<u64>,
    capacity: usize,
    peers: HashMap<Handle, SocketAddr>,
}

impl ReadinessRegistry {
    /// Creates an empty registry able to hold handles `0..capacity`.
    pub fn new(capacity: usize) -> Self {
        Self {
            bits: vec![0; capacity.div_ceil(WORD_BITS)],
            capacity,
            peers: HashMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Clears every handle and every peer address.
    pub fn zero(&mut self) {
        self.bits.iter_mut().for_each(|w| *w = 0);
        self.peers.clear();
    }

    /// Starts watching `handle`. Watching twice is the same as once.
    pub fn watch(&mut self, handle: Handle) -> Result<(), RegistryError> {
        let (word, mask) = self.slot(handle)?;
        self.bits[word] |= mask;
        Ok(())
    }

    /// Watches a client handle and records its peer address.
    pub fn watch_peer(&mut self, handle: Handle, peer: SocketAddr) -> Result<(), RegistryError> {
        self.watch(handle)?;
        self.peers.insert(handle, peer);
        Ok(())
    }

    /// Stops watching `handle` without touching the address table. Meant for
    /// handles that have no peer, i.e. the listener; use [`forget`] for
    /// connections.
    ///
    /// [`forget`]: ReadinessRegistry::forget
    pub fn unwatch(&mut self, handle: Handle) {
        if let Ok((word, mask)) = self.slot(handle) {
            self.bits[word] &= !mask;
        }
    }

    pub fn is_watched(&self, handle: Handle) -> bool {
        match self.slot(handle) {
            Ok((word, mask)) => self.bits[word] & mask != 0,
            Err(_) => false,
        }
    }

    pub fn address_of(&self, handle: Handle) -> Option<SocketAddr> {
        self.peers.get(&handle).copied()
    }

    /// Drops `handle` from the bitmap and the address table together.
    /// Forgetting an unwatched handle is a no-op.
    pub fn forget(&mut self, handle: Handle) {
        self.unwatch(handle);
        self.peers.remove(&handle);
    }

    /// Watched handles in ascending order.
    pub fn snapshot(&self) -> Vec<Handle> {
        let mut handles = Vec::new();

        for (i, &word) in self.bits.iter().enumerate() {
            let mut rest = word;
            while rest != 0 {
                let bit = rest.trailing_zeros() as usize;
                handles.push(Handle(i * WORD_BITS + bit));
                rest &= rest - 1;
            }
        }

        handles
    }

    /// Number of client handles with a recorded peer.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    fn slot(&self, handle: Handle) -> Result<(usize, u64), RegistryError> {
        if handle.0 >= self.capacity {
            return Err(RegistryError::CapacityExceeded {
                handle,
                capacity: self.capacity,
            });
        }
        Ok((handle.0 / WORD_BITS, 1 << (handle.0 % WORD_BITS)))
    }
}
