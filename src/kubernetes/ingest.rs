// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Ingestion workers: one watch loop or poll loop per (server, kind).
//!
//! Watch workers hold a streaming connection open and apply events as they
//! arrive; when the stream drops they invalidate the cached records for
//! that kind before reconnecting, because a dropped stream means the cache
//! may silently be stale. Poll workers refresh with a full list on an
//! interval and keep the last good snapshot across transient list failures.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::client::UpstreamClient;
use crate::mirror::{EventKind, Kind, MirrorCache, ObjectEvent};

/// Backoff after a failed list call. Short and fixed: a failing list may be
/// a transient blip on an otherwise intact inventory, so the snapshot is
/// kept and the next attempt comes soon.
const LIST_RETRY_DELAY: Duration = Duration::from_secs(10);

/// The set of kinds selected by the `--only` flag. Empty selects all.
#[derive(Debug, Clone, Default)]
pub struct KindSelection(Vec<Kind>);

impl KindSelection {
    pub fn allows(&self, kind: Kind) -> bool {
        self.0.is_empty() || self.0.contains(&kind)
    }
}

impl FromStr for KindSelection {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut kinds = Vec::new();
        for part in s.split(',') {
            let name = part.trim();
            if name.is_empty() {
                continue;
            }
            let kind = Kind::from_alias(name)
                .ok_or_else(|| anyhow!("unknown resource kind in --only: {name}"))?;
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        Ok(KindSelection(kinds))
    }
}

/// Spawn the workers for one upstream server: watch loops for the
/// watch-capable kinds, poll loops for the rest, both gated by `only`.
pub fn spawn_workers(
    cache: Arc<MirrorCache>,
    client: Arc<dyn UpstreamClient>,
    only: &KindSelection,
    interval: Duration,
) {
    for kind in Kind::ALL {
        if !only.allows(kind) {
            continue;
        }
        if kind.watchable() {
            spawn_watch(cache.clone(), client.clone(), kind);
        } else {
            spawn_poll(cache.clone(), client.clone(), kind, interval);
        }
    }
}

/// Spawn the watch worker for (server, kind): a reconnect loop feeding an
/// unbounded channel, and an applier draining it into the cache.
///
/// The two sides never block each other while the stream is up; the watch
/// side is only a decoder, the applier side is only a cache writer. When
/// the stream drops, the sender side closes, the applier finishes draining
/// the events that were already decoded, and only then is the kind
/// invalidated — so the invalidation happens-before anything the next
/// stream delivers.
pub fn spawn_watch(cache: Arc<MirrorCache>, client: Arc<dyn UpstreamClient>, kind: Kind) {
    let server = client.server().to_string();
    tokio::spawn(async move {
        loop {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let applier = {
                let cache = cache.clone();
                let server = server.clone();
                tokio::spawn(async move {
                    while let Some(event) = rx.recv().await {
                        apply(&cache, &server, event).await;
                    }
                })
            };

            info!(server = %server, %kind, "starting watch");
            match client.watch(kind, tx).await {
                Ok(()) => info!(server = %server, %kind, "watch connection closed, retrying"),
                Err(err) => {
                    warn!(server = %server, %kind, error = %err, "watch failed, retrying")
                }
            }
            let _ = applier.await;

            // records observed on the dropped stream can no longer be
            // trusted
            cache.invalidate_kind(&server, kind).await;
        }
    });
}

async fn apply(cache: &MirrorCache, server: &str, event: ObjectEvent) {
    match event.event {
        EventKind::Added | EventKind::Modified => {
            cache.update(server, event.resource).await;
        }
        EventKind::Deleted => {
            cache.delete(server, &event.resource).await;
        }
    }
}

/// Spawn the poll worker for (server, kind): list, replace the snapshot,
/// sleep, repeat. List failures back off without invalidating.
pub fn spawn_poll(
    cache: Arc<MirrorCache>,
    client: Arc<dyn UpstreamClient>,
    kind: Kind,
    interval: Duration,
) {
    let server = client.server().to_string();
    tokio::spawn(async move {
        loop {
            let resources = match client.list(kind).await {
                Ok(resources) => resources,
                Err(err) => {
                    warn!(server = %server, %kind, error = %err, "list failed, backing off");
                    tokio::time::sleep(LIST_RETRY_DELAY).await;
                    continue;
                }
            };

            cache.invalidate_kind(&server, kind).await;
            let count = resources.len();
            for resource in resources {
                cache.update(&server, resource).await;
            }
            info!(server = %server, %kind, count, "refreshed objects");

            tokio::time::sleep(interval).await;
        }
    });
}
