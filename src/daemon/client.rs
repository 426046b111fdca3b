// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Client stub for the mirror's RPC endpoint.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use super::{Request, Response, OBJECTS_METHOD};
use crate::mirror::{Resource, ResourceFilter};

/// The one call the mirror answers.
#[async_trait]
pub trait MirrorClient: Send + Sync {
    async fn objects(&self, filter: ResourceFilter) -> Result<Vec<Resource>>;
}

/// TCP implementation that dials once and reuses the connection. Requests
/// are serialized through a mutex so responses pair up with their request.
pub struct TcpMirrorClient {
    stream: Mutex<BufStream<TcpStream>>,
}

impl TcpMirrorClient {
    pub async fn connect(address: &str) -> Result<Self> {
        let stream = TcpStream::connect(address)
            .await
            .with_context(|| format!("could not connect to mirror at {address}"))?;
        Ok(TcpMirrorClient {
            stream: Mutex::new(BufStream::new(stream)),
        })
    }
}

#[async_trait]
impl MirrorClient for TcpMirrorClient {
    async fn objects(&self, filter: ResourceFilter) -> Result<Vec<Resource>> {
        let request = Request {
            method: OBJECTS_METHOD.to_string(),
            filter: Some(filter),
        };
        let mut payload = serde_json::to_vec(&request)?;
        payload.push(b'\n');

        let mut stream = self.stream.lock().await;
        stream.write_all(&payload).await?;
        stream.flush().await?;

        let mut line = String::new();
        let n = stream.read_line(&mut line).await?;
        if n == 0 {
            bail!("mirror closed the connection");
        }

        let response: Response =
            serde_json::from_str(&line).context("could not decode mirror response")?;
        if let Some(message) = response.error {
            bail!(message);
        }
        Ok(response.objects.unwrap_or_default())
    }
}
