//! Decoded signature image cache
//!
//! Entries are keyed by annotation id and tagged with a SHA-256 fingerprint of
//! the encoded payload. A payload change makes the entry stale, and a decode
//! that completes for an old fingerprint is dropped.

use std::collections::HashMap;
use std::fmt;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::annotation::{AnnotationId, SignatureImage};

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn of(image: &SignatureImage) -> Self {
        let digest = Sha256::digest(image.fingerprint_bytes());
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Fingerprint(bytes)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short prefix is enough for logs
        for b in &self.0[..6] {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
enum Entry<T> {
    Pending,
    Ready(T),
    Failed(String),
}

#[derive(Debug)]
struct Slot<T> {
    fingerprint: Fingerprint,
    entry: Entry<T>,
}

/// How the cache sees one signature right now
#[derive(Debug, PartialEq)]
pub enum CacheStatus<'a, T> {
    /// Never requested, or the payload changed since
    Missing,
    Pending,
    Ready(&'a T),
    Failed(&'a str),
}

#[derive(Debug)]
pub struct SignatureCache<T> {
    slots: HashMap<AnnotationId, Slot<T>>,
}

impl<T> Default for SignatureCache<T> {
    fn default() -> Self {
        Self {
            slots: HashMap::new(),
        }
    }
}

impl<T> SignatureCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self, id: AnnotationId, image: &SignatureImage) -> CacheStatus<'_, T> {
        self.status_for(id, Fingerprint::of(image))
    }

    pub fn status_for(&self, id: AnnotationId, fingerprint: Fingerprint) -> CacheStatus<'_, T> {
        match self.slots.get(&id) {
            Some(slot) if slot.fingerprint == fingerprint => match &slot.entry {
                Entry::Pending => CacheStatus::Pending,
                Entry::Ready(value) => CacheStatus::Ready(value),
                Entry::Failed(reason) => CacheStatus::Failed(reason),
            },
            _ => CacheStatus::Missing,
        }
    }

    /// Decoded value for `id`, regardless of fingerprint
    pub fn get(&self, id: AnnotationId) -> Option<&T> {
        match self.slots.get(&id).map(|s| &s.entry) {
            Some(Entry::Ready(value)) => Some(value),
            _ => None,
        }
    }

    /// Mark a decode as started. Returns the fingerprint the host must hand
    /// back to [`complete`](Self::complete), or `None` when the current
    /// payload is already pending, decoded or known bad.
    pub fn begin_decode(&mut self, id: AnnotationId, image: &SignatureImage) -> Option<Fingerprint> {
        let fingerprint = Fingerprint::of(image);
        if !matches!(self.status_for(id, fingerprint), CacheStatus::Missing) {
            return None;
        }
        self.slots.insert(
            id,
            Slot {
                fingerprint,
                entry: Entry::Pending,
            },
        );
        Some(fingerprint)
    }

    /// Store a decode result. Completions for a payload that is no longer
    /// current are ignored and return false.
    pub fn complete(
        &mut self,
        id: AnnotationId,
        fingerprint: Fingerprint,
        result: Result<T, String>,
    ) -> bool {
        let Some(slot) = self.slots.get_mut(&id) else {
            debug!(%id, %fingerprint, "decode completed for evicted signature");
            return false;
        };
        if slot.fingerprint != fingerprint || !matches!(slot.entry, Entry::Pending) {
            debug!(%id, %fingerprint, current = %slot.fingerprint, "stale decode ignored");
            return false;
        }
        slot.entry = match result {
            Ok(value) => Entry::Ready(value),
            Err(reason) => {
                debug!(%id, %reason, "signature decode failed");
                Entry::Failed(reason)
            }
        };
        true
    }

    pub fn invalidate(&mut self, id: AnnotationId) -> bool {
        self.slots.remove(&id).is_some()
    }

    /// Drop entries for annotations that no longer exist
    pub fn retain(&mut self, mut keep: impl FnMut(AnnotationId) -> bool) {
        self.slots.retain(|id, _| keep(*id));
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
