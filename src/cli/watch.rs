// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! The `watch` command: bind the RPC endpoint, open one upstream client per
//! URL, spawn the ingestion workers and serve queries until the process is
//! terminated.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context as _, Result};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use url::Url;

use crate::cli::Args;
use crate::daemon;
use crate::kubeconfig::Kubeconfig;
use crate::kubernetes::{spawn_workers, HttpUpstreamClient, KindSelection, UpstreamClient};
use crate::mirror::MirrorCache;

pub async fn run(args: &Args, interval: Duration, only: &str, urls: &[String]) -> Result<()> {
    if urls.is_empty() {
        bail!("no upstream server URL given");
    }

    let mut upstreams = Vec::with_capacity(urls.len());
    for raw in urls {
        let url =
            Url::parse(raw).map_err(|err| anyhow!("could not parse [{raw}] as a URL: {err}"))?;
        upstreams.push(url);
    }

    let only: KindSelection = only.parse()?;

    let bind = args.bind();
    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind on {bind}"))?;

    // TLS material comes from the kubeconfig when there is one; plain
    // HTTP upstreams work without it
    let http = match Kubeconfig::load(&args.kubeconfig) {
        Ok(config) => config.http_client()?,
        Err(err) => {
            debug!(error = %err, "no usable kubeconfig, using a plain HTTP client");
            reqwest::Client::builder()
                .build()
                .context("could not build HTTP client")?
        }
    };

    let cache = Arc::new(MirrorCache::new());
    for url in upstreams {
        let client: Arc<dyn UpstreamClient> =
            Arc::new(HttpUpstreamClient::new(url, http.clone()));
        info!(server = %client.server(), "created upstream client");

        let probe = client.clone();
        tokio::spawn(async move {
            if let Err(err) = probe.ping().await {
                warn!(server = %probe.server(), error = %err, "upstream did not answer ping");
            }
        });

        spawn_workers(cache.clone(), client, &only, interval);
    }

    info!(bind = %bind, "started to listen");
    daemon::serve(listener, cache).await
}
