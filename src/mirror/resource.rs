// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Resource model shared by the cache, the ingestion workers and the RPC
//! protocol: the closed set of mirrored kinds, the identity of an observed
//! object, and the filter used to query the mirror.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The kinds of resources the mirror tracks.
///
/// This is a closed set. High-churn kinds (pods, services, deployments) are
/// kept fresh with watch streams; the rest are refreshed with periodic lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Pod,
    Service,
    Deployment,
    ConfigMap,
    Namespace,
    Node,
}

impl Kind {
    pub const ALL: [Kind; 6] = [
        Kind::Pod,
        Kind::Service,
        Kind::Deployment,
        Kind::ConfigMap,
        Kind::Namespace,
        Kind::Node,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Pod => "pod",
            Kind::Service => "service",
            Kind::Deployment => "deployment",
            Kind::ConfigMap => "configmap",
            Kind::Namespace => "namespace",
            Kind::Node => "node",
        }
    }

    /// Collection path on the upstream API server.
    pub fn api_path(&self) -> &'static str {
        match self {
            Kind::Pod => "/api/v1/pods",
            Kind::Service => "/api/v1/services",
            Kind::Deployment => "/apis/extensions/v1beta1/deployments",
            Kind::ConfigMap => "/api/v1/configmaps",
            Kind::Namespace => "/api/v1/namespaces",
            Kind::Node => "/api/v1/nodes",
        }
    }

    /// Whether the upstream supports a streaming watch for this kind.
    /// Kinds without watch support are refreshed by periodic lists instead.
    pub fn watchable(&self) -> bool {
        matches!(self, Kind::Pod | Kind::Service | Kind::Deployment)
    }

    /// Namespaces and nodes are cluster-scoped; everything else lives in a
    /// namespace.
    pub fn namespaced(&self) -> bool {
        !matches!(self, Kind::Namespace | Kind::Node)
    }

    /// Resolve a kubectl-style resource alias (`po`, `pods`, `svc`, ...).
    /// Aliases are case-sensitive, matching kubectl.
    pub fn from_alias(alias: &str) -> Option<Kind> {
        match alias {
            "po" | "pod" | "pods" => Some(Kind::Pod),
            "svc" | "service" | "services" => Some(Kind::Service),
            "deployment" | "deployments" => Some(Kind::Deployment),
            "configmap" | "configmaps" => Some(Kind::ConfigMap),
            "ns" | "namespace" | "namespaces" => Some(Kind::Namespace),
            "no" | "node" | "nodes" => Some(Kind::Node),
            _ => None,
        }
    }

    /// Match a kind name case-insensitively. Upstream servers report kinds
    /// in CamelCase (`Pod`, `ConfigMap`) while the mirror stores them
    /// lowercase.
    pub fn from_name(name: &str) -> Option<Kind> {
        Kind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of an observed object as reported by the upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default, rename = "resourceVersion")]
    pub resource_version: String,
}

/// One record in the mirror: a kind plus the object identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub kind: Kind,
    #[serde(default)]
    pub meta: ObjectMeta,
}

impl Resource {
    pub fn new(kind: Kind, name: &str) -> Self {
        Resource {
            kind,
            meta: ObjectMeta {
                name: name.to_string(),
                ..ObjectMeta::default()
            },
        }
    }

    pub fn in_namespace(mut self, namespace: &str) -> Self {
        self.meta.namespace = namespace.to_string();
        self
    }

    pub fn at_version(mut self, version: &str) -> Self {
        self.meta.resource_version = version.to_string();
        self
    }
}

/// Raw object shape on the upstream wire. List responses usually omit the
/// per-item kind, so the client annotates it from the request.
#[derive(Debug, Clone, Deserialize)]
pub struct RawObject {
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub metadata: ObjectMeta,
}

impl RawObject {
    /// Convert into a cache record, falling back to the kind of the stream
    /// or list the object arrived on.
    pub fn into_resource(self, fallback: Kind) -> Resource {
        let kind = self
            .kind
            .as_deref()
            .and_then(Kind::from_name)
            .unwrap_or(fallback);
        let mut meta = self.metadata;
        if !kind.namespaced() {
            meta.namespace.clear();
        }
        Resource { kind, meta }
    }
}

/// Watch event type on the upstream wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventKind {
    Added,
    Modified,
    Deleted,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventKind::Added => "ADDED",
            EventKind::Modified => "MODIFIED",
            EventKind::Deleted => "DELETED",
        };
        f.write_str(s)
    }
}

/// One decoded entry of a watch stream.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchEvent {
    #[serde(rename = "type")]
    pub event: EventKind,
    pub object: RawObject,
}

/// A watch event after kind annotation, ready to be applied to the cache.
#[derive(Debug, Clone)]
pub struct ObjectEvent {
    pub event: EventKind,
    pub resource: Resource,
}

/// Query filter sent by clients. Empty `server` or `namespace` act as
/// wildcards; `kind` is required for a meaningful query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceFilter {
    #[serde(default)]
    pub server: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub kind: String,
}
