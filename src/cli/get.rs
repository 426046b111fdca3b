// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! The `get` command: derive a filter from the kubeconfig and whatever
//! flags the user passed to kubectl, ask the running mirror, and print the
//! matching names for the completion script to consume.

use std::io::Write;
use std::sync::LazyLock;

use anyhow::{anyhow, Context as _, Result};
use regex::Regex;
use tracing::debug;

use crate::cli::Args;
use crate::daemon::{MirrorClient, TcpMirrorClient};
use crate::kubeconfig::Kubeconfig;
use crate::mirror::{Kind, ResourceFilter};

static NAMESPACE_FLAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"--namespace[ =](\S+)").unwrap());
static SERVER_FLAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"--server[ =](\S+)").unwrap());
static CONTEXT_FLAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"--context[ =](\S+)").unwrap());
static CLUSTER_FLAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"--cluster[ =](\S+)").unwrap());

/// kubectl flags the mirror honors, scraped out of an opaque string.
/// Empty means not given.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct KubectlFlags {
    pub namespace: String,
    pub context: String,
    pub cluster: String,
    pub server: String,
}

pub async fn run(args: &Args, kubectl_flags: &str, resource: Option<&str>) -> Result<()> {
    let resource = resource.ok_or_else(|| anyhow!("no resource type is given"))?;
    let kind = Kind::from_alias(resource)
        .ok_or_else(|| anyhow!("unsupported resource type: {resource}"))?;

    let config = Kubeconfig::load(&args.kubeconfig)?;
    let flags = parse_kubectl_flags(kubectl_flags);
    let filter = derive_filter(kind, &config, &flags)?;

    let client = TcpMirrorClient::connect(&args.bind())
        .await
        .context("could not reach the mirror, is `kubemirror watch` running?")?;

    let mut stdout = std::io::stdout();
    write_names(&client, filter, &mut stdout).await
}

/// Scrape the sub-flags out of the opaque kubectl flag string. When a flag
/// occurs several times the last one wins.
pub fn parse_kubectl_flags(raw: &str) -> KubectlFlags {
    let mut flags = KubectlFlags::default();
    for captures in NAMESPACE_FLAG.captures_iter(raw) {
        flags.namespace = captures[1].to_string();
    }
    for captures in SERVER_FLAG.captures_iter(raw) {
        flags.server = captures[1].to_string();
    }
    for captures in CONTEXT_FLAG.captures_iter(raw) {
        flags.context = captures[1].to_string();
    }
    for captures in CLUSTER_FLAG.captures_iter(raw) {
        flags.cluster = captures[1].to_string();
    }
    debug!(input = raw, ?flags, "parsed kubectl flags");
    flags
}

/// Build the query filter: start from the current context (possibly
/// replaced by `--context`), then let `--namespace`, `--cluster` and
/// `--server` override the derived values, in that order of precedence.
pub fn derive_filter(
    kind: Kind,
    config: &Kubeconfig,
    flags: &KubectlFlags,
) -> Result<ResourceFilter> {
    let mut config = config.clone();
    if !flags.context.is_empty() {
        config.current_context = flags.context.clone();
    }

    let mut filter = config.base_filter();
    if !flags.namespace.is_empty() {
        filter.namespace = flags.namespace.clone();
    }
    if !flags.cluster.is_empty() {
        let cluster = config
            .cluster(&flags.cluster)
            .ok_or_else(|| anyhow!("cluster {} not found in kubeconfig", flags.cluster))?;
        filter.server = cluster.server.clone();
    }
    if !flags.server.is_empty() {
        filter.server = flags.server.clone();
    }

    filter.kind = kind.as_str().to_string();
    if kind == Kind::Node {
        // nodes are cluster-scoped, a namespace would never match
        filter.namespace.clear();
    }

    Ok(filter)
}

/// Query the mirror and write the names separated by a single space, with
/// no trailing newline — the shell's `compgen` wants them exactly so.
pub async fn write_names<W: Write>(
    client: &dyn MirrorClient,
    filter: ResourceFilter,
    out: &mut W,
) -> Result<()> {
    let objects = client.objects(filter).await?;
    for (i, object) in objects.iter().enumerate() {
        if i != 0 {
            out.write_all(b" ")?;
        }
        out.write_all(object.meta.name.as_bytes())?;
    }
    out.flush()?;
    Ok(())
}
