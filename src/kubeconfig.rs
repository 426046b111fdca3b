// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! The user's cluster-config file (`~/.kube/config`).
//!
//! Only the fields the mirror needs are read: cluster server URLs and TLS
//! material, each context's cluster/namespace/user, and the users' client
//! certificates. Everything else in the file is ignored.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context as _, Result};
use base64::Engine as _;
use serde::Deserialize;

use crate::mirror::ResourceFilter;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Kubeconfig {
    #[serde(default)]
    pub clusters: Vec<NamedCluster>,
    #[serde(default)]
    pub contexts: Vec<NamedContext>,
    #[serde(default)]
    pub users: Vec<NamedUser>,
    #[serde(default, rename = "current-context")]
    pub current_context: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NamedCluster {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub cluster: Cluster,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Cluster {
    #[serde(default)]
    pub server: String,
    #[serde(default, rename = "certificate-authority")]
    pub certificate_authority: Option<PathBuf>,
    #[serde(default, rename = "certificate-authority-data")]
    pub certificate_authority_data: Option<String>,
    #[serde(default, rename = "insecure-skip-tls-verify")]
    pub insecure_skip_tls_verify: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NamedContext {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub context: KubeContext,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KubeContext {
    #[serde(default)]
    pub cluster: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub user: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NamedUser {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub user: User,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct User {
    #[serde(default, rename = "client-certificate")]
    pub client_certificate: Option<PathBuf>,
    #[serde(default, rename = "client-certificate-data")]
    pub client_certificate_data: Option<String>,
    #[serde(default, rename = "client-key")]
    pub client_key: Option<PathBuf>,
    #[serde(default, rename = "client-key-data")]
    pub client_key_data: Option<String>,
}

impl Kubeconfig {
    /// Read and parse the file, expanding a leading `~`.
    pub fn load(path: &str) -> Result<Self> {
        let resolved = expand_home(path)
            .with_context(|| format!("could not resolve ~ in path {path}"))?;
        let raw = std::fs::read_to_string(&resolved)
            .with_context(|| format!("could not read kubeconfig file {}", resolved.display()))?;
        serde_yaml::from_str(&raw)
            .with_context(|| format!("could not parse kubeconfig file {}", resolved.display()))
    }

    pub fn context(&self, name: &str) -> Option<&KubeContext> {
        self.contexts
            .iter()
            .find(|c| c.name == name)
            .map(|c| &c.context)
    }

    pub fn cluster(&self, name: &str) -> Option<&Cluster> {
        self.clusters
            .iter()
            .find(|c| c.name == name)
            .map(|c| &c.cluster)
    }

    pub fn user(&self, name: &str) -> Option<&User> {
        self.users.iter().find(|u| u.name == name).map(|u| &u.user)
    }

    fn current_cluster(&self) -> Option<&Cluster> {
        let context = self.context(&self.current_context)?;
        self.cluster(&context.cluster)
    }

    /// Filter derived from the current context: its namespace, and its
    /// cluster's server URL with a trailing `:port` stripped. Missing
    /// pieces become wildcards.
    pub fn base_filter(&self) -> ResourceFilter {
        let context = self.context(&self.current_context);
        let cluster = context.and_then(|c| self.cluster(&c.cluster));
        ResourceFilter {
            server: cluster.map(|c| strip_port(&c.server).to_string()).unwrap_or_default(),
            namespace: context.map(|c| c.namespace.clone()).unwrap_or_default(),
            kind: String::new(),
        }
    }

    /// Build the HTTP client used for every upstream connection, carrying
    /// the current context's TLS material: the cluster CA and the user's
    /// client certificate, if configured.
    pub fn http_client(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder().use_rustls_tls();

        if let Some(cluster) = self.current_cluster() {
            if cluster.insecure_skip_tls_verify {
                builder = builder.danger_accept_invalid_certs(true);
            }
            if let Some(pem) = read_pem(
                cluster.certificate_authority_data.as_deref(),
                cluster.certificate_authority.as_deref(),
            )? {
                let cert = reqwest::Certificate::from_pem(&pem)
                    .context("invalid cluster certificate authority")?;
                builder = builder.add_root_certificate(cert);
            }
        }

        let user = self
            .context(&self.current_context)
            .and_then(|c| self.user(&c.user));
        if let Some(user) = user {
            let cert = read_pem(
                user.client_certificate_data.as_deref(),
                user.client_certificate.as_deref(),
            )?;
            let key = read_pem(user.client_key_data.as_deref(), user.client_key.as_deref())?;
            if let (Some(mut cert), Some(key)) = (cert, key) {
                cert.extend_from_slice(&key);
                let identity = reqwest::Identity::from_pem(&cert)
                    .context("invalid client certificate or key")?;
                builder = builder.identity(identity);
            }
        }

        builder.build().context("could not build HTTP client")
    }
}

/// Inline base64 data wins over a file path; neither yields `None`.
fn read_pem(data: Option<&str>, path: Option<&Path>) -> Result<Option<Vec<u8>>> {
    if let Some(data) = data {
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(data.trim())
            .context("invalid base64 in kubeconfig")?;
        return Ok(Some(decoded));
    }
    if let Some(path) = path {
        let raw = std::fs::read(path)
            .with_context(|| format!("could not read {}", path.display()))?;
        return Ok(Some(raw));
    }
    Ok(None)
}

/// Replace a leading `~` with the user's home directory.
fn expand_home(path: &str) -> Result<PathBuf> {
    if let Some(rest) = path.strip_prefix("~/") {
        let home = dirs::home_dir().ok_or_else(|| anyhow!("home directory is not known"))?;
        return Ok(home.join(rest));
    }
    if path == "~" {
        return dirs::home_dir().ok_or_else(|| anyhow!("home directory is not known"));
    }
    Ok(PathBuf::from(path))
}

/// Strip a trailing `:port` for server comparison, keeping the scheme
/// separator of port-less URLs intact.
fn strip_port(server: &str) -> &str {
    match server.rfind(':') {
        Some(idx) if idx >= 7 => &server[..idx],
        _ => server,
    }
}
