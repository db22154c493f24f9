// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::McpToolInfo;

/// Process-wide cache of discovered tool lists, keyed by qualified server
/// name.  Entries older than the TTL are ignored; a zero TTL disables the
/// cache.
#[derive(Debug)]
pub struct McpSchemaCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, (Instant, Vec<McpToolInfo>)>>,
}

impl McpSchemaCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: RwLock::new(HashMap::new()) }
    }

    pub fn from_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    pub async fn get(&self, qualified_name: &str) -> Option<Vec<McpToolInfo>> {
        if self.ttl.is_zero() {
            return None;
        }
        let entries = self.entries.read().await;
        entries
            .get(qualified_name)
            .filter(|(stored, _)| stored.elapsed() < self.ttl)
            .map(|(_, tools)| tools.clone())
    }

    pub async fn put(&self, qualified_name: &str, tools: Vec<McpToolInfo>) {
        if self.ttl.is_zero() {
            return;
        }
        let mut entries = self.entries.write().await;
        let ttl = self.ttl;
        entries.retain(|_, (stored, _)| stored.elapsed() < ttl);
        entries.insert(qualified_name.to_string(), (Instant::now(), tools));
    }

    /// Number of stored entries, stale ones included until the next `put`.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
