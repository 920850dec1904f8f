//! Channel-to-connection assignment tracking.
//!
//! The registry is the pool's memory of where each channel lives, so that
//! unsubscribe goes to the right socket and a reopened connection knows what
//! it used to carry.

use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Default)]
struct RegistryInner {
    by_channel: HashMap<String, usize>,
    cursor: usize,
}

/// Tracks which connection index carries each subscribed channel.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    inner: RwLock<RegistryInner>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&self, channel: &str, index: usize) {
        self.inner
            .write()
            .by_channel
            .insert(channel.to_string(), index);
    }

    pub fn connection_of(&self, channel: &str) -> Option<usize> {
        self.inner.read().by_channel.get(channel).copied()
    }

    pub fn remove(&self, channel: &str) -> Option<usize> {
        self.inner.write().by_channel.remove(channel)
    }

    /// Channels currently assigned to `index`, sorted for stable frames.
    pub fn channels_on(&self, index: usize) -> Vec<String> {
        let mut channels: Vec<String> = self
            .inner
            .read()
            .by_channel
            .iter()
            .filter(|(_, &i)| i == index)
            .map(|(c, _)| c.clone())
            .collect();
        channels.sort();
        channels
    }

    pub fn len(&self) -> usize {
        self.inner.read().by_channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Round-robin pick among `candidates` (open connection indices).
    pub fn next_spread(&self, candidates: &[usize]) -> Option<usize> {
        if candidates.is_empty() {
            return None;
        }
        let mut inner = self.inner.write();
        let pick = candidates[inner.cursor % candidates.len()];
        inner.cursor = inner.cursor.wrapping_add(1);
        Some(pick)
    }
}
