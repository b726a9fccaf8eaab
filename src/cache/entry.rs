//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with age tracking.

use std::time::Duration;

use tokio::time::Instant;

use crate::cache::lru::{Linked, Links};

// == Cache Entry ==
/// A key, the handle stored under it, and the time it was created.
///
/// Only the recency links change after construction.
#[derive(Debug)]
pub struct CacheEntry<K, H> {
    key: K,
    handle: H,
    /// Creation time on the tokio clock
    created_at: Instant,
    /// Unique per cache; distinguishes this entry from later ones under the same key
    serial: u64,
    links: Links,
}

impl<K, H> CacheEntry<K, H> {
    // == Constructor ==
    /// Creates an unlinked entry stamped with the current time.
    pub fn new(key: K, handle: H, serial: u64) -> Self {
        Self {
            key,
            handle,
            created_at: Instant::now(),
            serial,
            links: Links::default(),
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn handle(&self) -> &H {
        &self.handle
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }

    // == Is Expired ==
    /// Checks if the entry is older than `max_age`.
    ///
    /// An entry exactly `max_age` old is still valid; it expires strictly
    /// after that. With no `max_age`, or one too large for the clock to
    /// reach, entries never expire.
    pub fn is_expired(&self, max_age: Option<Duration>) -> bool {
        self.is_expired_at(Instant::now(), max_age)
    }

    /// Same as [`is_expired`](Self::is_expired) against an already sampled clock.
    pub fn is_expired_at(&self, now: Instant, max_age: Option<Duration>) -> bool {
        max_age
            .and_then(|max_age| self.created_at.checked_add(max_age))
            .is_some_and(|deadline| now > deadline)
    }
}

impl<K, H> Linked for CacheEntry<K, H> {
    fn links(&self) -> &Links {
        &self.links
    }

    fn links_mut(&mut self) -> &mut Links {
        &mut self.links
    }
}
