//! In-process store with failure injection.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::store::{RemoteError, RemoteStore, StoreFuture};

const LOCATOR_PREFIX: &str = "mem://slice/";

/// [`RemoteStore`] that keeps payloads in memory.
///
/// Locators look like `mem://slice/<n>`. Puts and gets can be made to fail a
/// set number of times, and stored payloads can be corrupted in place, which
/// is what the pipeline tests use to exercise retries and checksum failures.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    blobs: Vec<Vec<u8>>,
    /// label -> put attempts seen, successful or not.
    put_attempts: HashMap<u64, u32>,
    /// label -> (remaining failures, reject instead of transport error)
    put_failures: HashMap<u64, (u32, bool)>,
    /// locator -> remaining failures
    get_failures: HashMap<String, u32>,
    get_calls: u32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes the next `times` puts for `label` fail with a transport error.
    pub fn fail_puts(&self, label: u64, times: u32) {
        self.lock().put_failures.insert(label, (times, false));
    }

    /// Makes the next `times` puts for `label` be rejected with status 500.
    pub fn reject_puts(&self, label: u64, times: u32) {
        self.lock().put_failures.insert(label, (times, true));
    }

    /// Makes the next `times` gets of `locator` fail with a transport error.
    pub fn fail_gets(&self, locator: &str, times: u32) {
        self.lock().get_failures.insert(locator.to_string(), times);
    }

    /// Stores a payload directly and returns its locator.
    pub fn insert(&self, payload: &[u8]) -> String {
        let mut inner = self.lock();
        inner.blobs.push(payload.to_vec());
        format!("{LOCATOR_PREFIX}{}", inner.blobs.len() - 1)
    }

    /// Flips every bit of the stored payload, keeping its length.
    ///
    /// Returns `false` if the locator is unknown.
    pub fn corrupt(&self, locator: &str) -> bool {
        let mut inner = self.lock();
        match parse_locator(locator) {
            Some(i) if i < inner.blobs.len() => {
                inner.blobs[i].iter_mut().for_each(|b| *b = !*b);
                true
            }
            _ => false,
        }
    }

    /// Put attempts seen for `label`, including failed ones.
    pub fn put_attempts(&self, label: u64) -> u32 {
        self.lock().put_attempts.get(&label).copied().unwrap_or(0)
    }

    /// Total get calls, including failed ones.
    pub fn get_calls(&self) -> u32 {
        self.lock().get_calls
    }

    /// Number of stored payloads.
    pub fn len(&self) -> usize {
        self.lock().blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn put_now(&self, payload: &[u8], label: u64) -> Result<String, RemoteError> {
        let mut inner = self.lock();
        *inner.put_attempts.entry(label).or_insert(0) += 1;

        if let Some((remaining, reject)) = inner.put_failures.get_mut(&label)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(if *reject {
                RemoteError::Rejected {
                    status: 500,
                    body: "injected rejection".into(),
                }
            } else {
                RemoteError::Transport("injected transport failure".into())
            });
        }

        inner.blobs.push(payload.to_vec());
        Ok(format!("{LOCATOR_PREFIX}{}", inner.blobs.len() - 1))
    }

    fn get_now(&self, locator: &str) -> Result<Vec<u8>, RemoteError> {
        let mut inner = self.lock();
        inner.get_calls += 1;

        if let Some(remaining) = inner.get_failures.get_mut(locator)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(RemoteError::Transport("injected transport failure".into()));
        }

        match parse_locator(locator) {
            Some(i) if i < inner.blobs.len() => Ok(inner.blobs[i].clone()),
            _ => Err(RemoteError::Rejected {
                status: 404,
                body: format!("no such slice: {locator}"),
            }),
        }
    }
}

impl RemoteStore for MemoryStore {
    fn put<'a>(&'a self, payload: &'a [u8], label: u64) -> StoreFuture<'a, String> {
        Box::pin(async move { self.put_now(payload, label) })
    }

    fn get<'a>(&'a self, locator: &'a str) -> StoreFuture<'a, Vec<u8>> {
        Box::pin(async move { self.get_now(locator) })
    }
}

fn parse_locator(locator: &str) -> Option<usize> {
    locator.strip_prefix(LOCATOR_PREFIX)?.parse().ok()
}
