//! The local RPC endpoint the cache is mounted on, and the matching client.
//!
//! The protocol is newline-delimited JSON over TCP: one request object per
//! line, one response object per line. There is a single method,
//! `MirrorCache.Objects`, taking a filter and returning records. The
//! endpoint binds a loopback address by default and performs no
//! authentication; the host is trusted.

mod client;
mod server;

pub use client::{MirrorClient, TcpMirrorClient};
pub use server::serve;

use serde::{Deserialize, Serialize};

use crate::mirror::{Resource, ResourceFilter};

/// Service name of the cache query method.
pub const OBJECTS_METHOD: &str = "MirrorCache.Objects";

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Request {
    pub method: String,
    #[serde(default)]
    pub filter: Option<ResourceFilter>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objects: Option<Vec<Resource>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub(crate) fn objects(objects: Vec<Resource>) -> Self {
        Response {
            objects: Some(objects),
            error: None,
        }
    }

    pub(crate) fn error(message: impl Into<String>) -> Self {
        Response {
            objects: None,
            error: Some(message.into()),
        }
    }
}
