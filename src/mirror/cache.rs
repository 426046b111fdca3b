// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Process-wide cache of observed resources, grouped by upstream server.
//!
//! The cache is the only shared mutable state in the process: ingestion
//! workers write into it, the RPC endpoint reads from it. Every operation
//! takes the lock for its whole duration, so readers always see either the
//! pre- or post-state of a write, never a torn view.

use std::collections::HashMap;

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use super::resource::{Kind, Resource, ResourceFilter};

/// Errors a query can fail with. Mutators never fail.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("unknown server {0}")]
    UnknownServer(String),
    #[error("cannot query objects without a filter")]
    InvalidFilter,
}

/// In-memory index of observed resources keyed by upstream server identity.
///
/// Within one server the records keep the insertion order of their first
/// observation; updates replace in place, deletes compact the sequence.
pub struct MirrorCache {
    objects: RwLock<HashMap<String, Vec<Resource>>>,
}

impl MirrorCache {
    pub fn new() -> Self {
        MirrorCache {
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Insert the record, or replace an existing one with the same
    /// (name, namespace, kind) identity in place.
    pub async fn update(&self, server: &str, resource: Resource) {
        let mut objects = self.objects.write().await;
        let records = objects.entry(server.to_string()).or_default();
        match records.iter_mut().find(|r| {
            r.meta.name == resource.meta.name
                && r.meta.namespace == resource.meta.namespace
                && r.kind == resource.kind
        }) {
            Some(existing) => *existing = resource,
            None => records.push(resource),
        }
    }

    /// Remove the record matching the resource's (name, namespace), if any.
    ///
    /// The kind is deliberately not part of the match: delete events arrive
    /// on per-kind watch streams, so the identity is unambiguous there.
    pub async fn delete(&self, server: &str, resource: &Resource) {
        let mut objects = self.objects.write().await;
        if let Some(records) = objects.get_mut(server) {
            if let Some(idx) = records.iter().position(|r| {
                r.meta.name == resource.meta.name && r.meta.namespace == resource.meta.namespace
            }) {
                records.remove(idx);
            }
        }
    }

    /// Atomically drop every record of `kind` under `server`, leaving other
    /// kinds untouched. Used when a watch stream terminates and its records
    /// can no longer be trusted.
    pub async fn invalidate_kind(&self, server: &str, kind: Kind) {
        let mut objects = self.objects.write().await;
        if let Some(records) = objects.get_mut(server) {
            records.retain(|r| r.kind != kind);
        }
    }

    /// Return the records matching the filter.
    ///
    /// Servers are matched case-insensitively with a trailing `:port`
    /// stripped, and iterated in ascending order of their identity; within
    /// one server the stored insertion order is kept. An empty filter server
    /// means all servers; a named server that matches nothing is an error.
    pub async fn query(&self, filter: &ResourceFilter) -> Result<Vec<Resource>, QueryError> {
        let objects = self.objects.read().await;
        debug!(?filter, "received query");

        let mut servers: Vec<&String> = objects
            .keys()
            .filter(|server| {
                filter.server.is_empty()
                    || trim_port(&filter.server).eq_ignore_ascii_case(trim_port(server))
            })
            .collect();

        if !filter.server.is_empty() && servers.is_empty() {
            return Err(QueryError::UnknownServer(filter.server.clone()));
        }

        servers.sort();

        let mut res = Vec::new();
        for server in servers {
            for record in &objects[server] {
                let kind_matches = record.kind.as_str().eq_ignore_ascii_case(&filter.kind);
                let namespace_matches = filter.namespace.is_empty()
                    || record.meta.namespace.eq_ignore_ascii_case(&filter.namespace);
                if kind_matches && namespace_matches {
                    res.push(record.clone());
                }
            }
        }

        debug!(?filter, count = res.len(), "returning query result");
        Ok(res)
    }
}

impl Default for MirrorCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Strip a trailing `:port` from a server URL. The guard keeps the scheme
/// separator of port-less URLs (`https://h`) intact.
fn trim_port(url: &str) -> &str {
    match url.rfind(':') {
        Some(idx) if idx >= 7 => &url[..idx],
        _ => url,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERVER: &str = "https://k8s.example:8443";

    #[tokio::test]
    async fn update_appends_and_replaces_in_place() {
        let cache = MirrorCache::new();
        cache.update(SERVER, Resource::new(Kind::Pod, "a")).await;
        cache.update(SERVER, Resource::new(Kind::Pod, "b")).await;
        cache
            .update(SERVER, Resource::new(Kind::Pod, "a").at_version("2"))
            .await;

        let res = cache
            .query(&ResourceFilter {
                kind: "pod".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        let names: Vec<&str> = res.iter().map(|r| r.meta.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(res[0].meta.resource_version, "2");
    }

    #[tokio::test]
    async fn update_is_idempotent() {
        let cache = MirrorCache::new();
        let pod = Resource::new(Kind::Pod, "a").in_namespace("ns1");
        cache.update(SERVER, pod.clone()).await;
        cache.update(SERVER, pod.clone()).await;

        let res = cache
            .query(&ResourceFilter {
                kind: "pod".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(res, vec![pod]);
    }

    #[tokio::test]
    async fn same_name_in_different_namespaces_are_distinct() {
        let cache = MirrorCache::new();
        cache
            .update(SERVER, Resource::new(Kind::Pod, "a").in_namespace("ns1"))
            .await;
        cache
            .update(SERVER, Resource::new(Kind::Pod, "a").in_namespace("ns2"))
            .await;

        let res = cache
            .query(&ResourceFilter {
                kind: "pod".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(res.len(), 2);
    }

    #[tokio::test]
    async fn delete_removes_matching_record() {
        let cache = MirrorCache::new();
        cache.update(SERVER, Resource::new(Kind::Pod, "a")).await;
        cache.update(SERVER, Resource::new(Kind::Pod, "b")).await;
        cache.delete(SERVER, &Resource::new(Kind::Pod, "a")).await;

        let res = cache
            .query(&ResourceFilter {
                kind: "pod".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(res, vec![Resource::new(Kind::Pod, "b")]);

        // deleting on an unknown server is a no-op
        cache
            .delete("http://other.example", &Resource::new(Kind::Pod, "b"))
            .await;
    }

    #[tokio::test]
    async fn update_then_delete_restores_pre_update_state() {
        let cache = MirrorCache::new();
        let pod = Resource::new(Kind::Pod, "a");
        cache.update(SERVER, pod.clone()).await;
        cache.delete(SERVER, &pod).await;

        let res = cache
            .query(&ResourceFilter {
                kind: "pod".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(res.is_empty());
    }

    #[tokio::test]
    async fn invalidate_kind_spares_other_kinds() {
        let cache = MirrorCache::new();
        cache.update(SERVER, Resource::new(Kind::Pod, "p")).await;
        cache
            .update(SERVER, Resource::new(Kind::Service, "s"))
            .await;
        cache.invalidate_kind(SERVER, Kind::Pod).await;

        let pods = cache
            .query(&ResourceFilter {
                kind: "pod".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(pods.is_empty());

        let services = cache
            .query(&ResourceFilter {
                kind: "service".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(services, vec![Resource::new(Kind::Service, "s")]);
    }

    #[tokio::test]
    async fn query_unknown_server_fails() {
        let cache = MirrorCache::new();
        cache.update(SERVER, Resource::new(Kind::Pod, "p")).await;

        let err = cache
            .query(&ResourceFilter {
                server: "https://nowhere.example".into(),
                kind: "pod".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(
            err,
            QueryError::UnknownServer("https://nowhere.example".into())
        );
    }

    #[tokio::test]
    async fn query_empty_kind_returns_nothing() {
        let cache = MirrorCache::new();
        cache.update(SERVER, Resource::new(Kind::Pod, "p")).await;

        let res = cache.query(&ResourceFilter::default()).await.unwrap();
        assert!(res.is_empty());
    }

    #[tokio::test]
    async fn query_matches_server_ignoring_case_and_port() {
        let cache = MirrorCache::new();
        cache.update(SERVER, Resource::new(Kind::Pod, "p")).await;

        for spelling in ["HTTPS://K8S.EXAMPLE:8443", "https://k8s.example", "HTTPS://k8s.example"] {
            let res = cache
                .query(&ResourceFilter {
                    server: spelling.into(),
                    kind: "pod".into(),
                    ..Default::default()
                })
                .await
                .unwrap();
            assert_eq!(res.len(), 1, "spelling {spelling}");
        }
    }

    #[tokio::test]
    async fn query_filters_namespace_case_insensitively() {
        let cache = MirrorCache::new();
        cache
            .update(SERVER, Resource::new(Kind::Pod, "a").in_namespace("ns1"))
            .await;
        cache
            .update(SERVER, Resource::new(Kind::Pod, "b").in_namespace("ns2"))
            .await;

        let res = cache
            .query(&ResourceFilter {
                namespace: "NS2".into(),
                kind: "pod".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(res.len(), 1);
        assert_eq!(res[0].meta.name, "b");
    }

    #[tokio::test]
    async fn query_orders_by_server_then_insertion() {
        let cache = MirrorCache::new();
        cache
            .update("http://b.example", Resource::new(Kind::Pod, "p-b"))
            .await;
        cache
            .update("http://a.example", Resource::new(Kind::Pod, "p-a2"))
            .await;
        cache
            .update("http://a.example", Resource::new(Kind::Pod, "p-a1"))
            .await;

        let res = cache
            .query(&ResourceFilter {
                kind: "pod".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        let names: Vec<&str> = res.iter().map(|r| r.meta.name.as_str()).collect();
        assert_eq!(names, ["p-a2", "p-a1", "p-b"]);
    }

    #[test]
    fn trim_port_keeps_scheme_separator() {
        assert_eq!(trim_port("https://h:8443"), "https://h");
        assert_eq!(trim_port("https://h"), "https://h");
        assert_eq!(trim_port("http://a.example"), "http://a.example");
        assert_eq!(trim_port("x1.com"), "x1.com");
    }
}
