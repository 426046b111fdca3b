// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Accept loop and request dispatch for the mirror's RPC endpoint.

use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error};

use super::{Request, Response, OBJECTS_METHOD};
use crate::mirror::{MirrorCache, QueryError};

/// Serve the cache's query method on the listener until the process exits.
/// Each connection is handled on its own task, so concurrent calls are
/// served in parallel.
pub async fn serve(listener: TcpListener, cache: Arc<MirrorCache>) -> Result<()> {
    loop {
        let (socket, peer) = listener.accept().await?;
        debug!(%peer, "accepted connection");

        let cache = cache.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_connection(socket, cache).await {
                error!(%peer, error = %err, "connection error");
            }
        });
    }
}

async fn handle_connection(socket: TcpStream, cache: Arc<MirrorCache>) -> Result<()> {
    let (reader, mut writer) = socket.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = dispatch(&line, &cache).await;
        let mut payload = serde_json::to_vec(&response)?;
        payload.push(b'\n');
        writer.write_all(&payload).await?;
    }

    Ok(())
}

async fn dispatch(line: &str, cache: &MirrorCache) -> Response {
    let request: Request = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(err) => return Response::error(format!("malformed request: {err}")),
    };

    if request.method != OBJECTS_METHOD {
        return Response::error(format!("unknown method {}", request.method));
    }

    let filter = match request.filter {
        Some(filter) => filter,
        None => return Response::error(QueryError::InvalidFilter.to_string()),
    };

    match cache.query(&filter).await {
        Ok(objects) => Response::objects(objects),
        Err(err) => Response::error(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::{MirrorClient, TcpMirrorClient};
    use crate::mirror::{Kind, Resource, ResourceFilter};

    async fn start_mirror(cache: Arc<MirrorCache>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(serve(listener, cache));
        addr
    }

    #[tokio::test]
    async fn round_trip_through_the_wire() {
        let cache = Arc::new(MirrorCache::new());
        cache
            .update("http://k8s-1.example", Resource::new(Kind::Pod, "pod1"))
            .await;
        let addr = start_mirror(cache).await;

        let client = TcpMirrorClient::connect(&addr).await.unwrap();
        let objects = client
            .objects(ResourceFilter {
                kind: "pod".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(objects, vec![Resource::new(Kind::Pod, "pod1")]);
    }

    #[tokio::test]
    async fn several_requests_reuse_one_connection() {
        let cache = Arc::new(MirrorCache::new());
        cache
            .update("http://k8s-1.example", Resource::new(Kind::Pod, "pod1"))
            .await;
        cache
            .update("http://k8s-1.example", Resource::new(Kind::Service, "svc1"))
            .await;
        let addr = start_mirror(cache).await;

        let client = TcpMirrorClient::connect(&addr).await.unwrap();
        for kind in ["pod", "service"] {
            let objects = client
                .objects(ResourceFilter {
                    kind: kind.into(),
                    ..Default::default()
                })
                .await
                .unwrap();
            assert_eq!(objects.len(), 1, "kind {kind}");
        }
    }

    #[tokio::test]
    async fn query_errors_reach_the_client() {
        let cache = Arc::new(MirrorCache::new());
        let addr = start_mirror(cache).await;

        let client = TcpMirrorClient::connect(&addr).await.unwrap();
        let err = client
            .objects(ResourceFilter {
                server: "http://unknown.example".into(),
                kind: "pod".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unknown server"));
    }

    #[tokio::test]
    async fn missing_filter_is_rejected() {
        let response = dispatch(r#"{"method":"MirrorCache.Objects"}"#, &MirrorCache::new()).await;
        assert_eq!(
            response.error.as_deref(),
            Some("cannot query objects without a filter")
        );
    }

    #[tokio::test]
    async fn unknown_method_is_rejected() {
        let response = dispatch(
            r#"{"method":"MirrorCache.Everything","filter":{}}"#,
            &MirrorCache::new(),
        )
        .await;
        assert!(response.error.unwrap().contains("unknown method"));
    }

    #[tokio::test]
    async fn malformed_request_is_rejected() {
        let response = dispatch("{oops", &MirrorCache::new()).await;
        assert!(response.error.unwrap().contains("malformed request"));
    }
}
