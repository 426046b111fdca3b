// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "kubemirror")]
#[command(version, about = "Mirror the names of Kubernetes resources for fast completion")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// The IP address where the mirror is accessible
    #[arg(short = 'a', long, global = true, default_value = "127.0.0.1")]
    pub address: String,

    /// The port on which the mirror is accessible
    #[arg(short = 'p', long, global = true, default_value_t = 33033)]
    pub port: u16,

    /// Path to the kubeconfig file
    #[arg(long, global = true, default_value = "~/.kube/config")]
    pub kubeconfig: String,

    /// Enable verbose output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,
}

impl Args {
    /// The address:port the mirror listens on or is dialed at.
    pub fn bind(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start a mirror of the given Kubernetes API servers
    Watch {
        /// Interval between list requests to the upstream servers
        #[arg(long, default_value = "2m", value_parser = humantime::parse_duration)]
        interval: Duration,

        /// Comma-separated kinds to mirror, empty to mirror all supported
        #[arg(long, default_value = "")]
        only: String,

        /// Base URLs of the API servers to mirror
        urls: Vec<String>,
    },

    /// Ask a running mirror for the names of alive resources
    Get {
        /// An arbitrary string with flags accepted by kubectl; --namespace,
        /// --context, --cluster and --server are honored
        #[arg(long = "kubectl-flags", default_value = "")]
        kubectl_flags: String,

        /// Resource type, e.g. po, pods, svc, deployments, ns, nodes
        resource: Option<String>,
    },

    /// Print a completion script for kubectl backed by the mirror
    Completion {
        /// Shell to generate the script for
        #[arg(value_enum)]
        shell: Shell,

        /// Alias of your kubectl command
        #[arg(long, default_value = "kubectl")]
        kubectl_alias: String,

        /// Path to the kubemirror binary, if it is outside $PATH
        #[arg(long, default_value = "kubemirror")]
        mirror_path: String,
    },

    /// Print the version
    Version,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shell {
    Bash,
    Zsh,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_defaults() {
        let args = Args::parse_from(["kubemirror", "watch", "http://k8s.example"]);
        assert_eq!(args.address, "127.0.0.1");
        assert_eq!(args.port, 33033);
        assert!(!args.verbose);
        match args.command {
            Command::Watch {
                interval,
                only,
                urls,
            } => {
                assert_eq!(interval, Duration::from_secs(120));
                assert!(only.is_empty());
                assert_eq!(urls, ["http://k8s.example"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn global_flags_after_the_subcommand() {
        let args = Args::parse_from(["kubemirror", "get", "-a", "0.0.0.0", "-p", "40000", "pod"]);
        assert_eq!(args.bind(), "0.0.0.0:40000");
    }

    #[test]
    fn interval_accepts_human_durations() {
        let args = Args::parse_from(["kubemirror", "watch", "--interval", "10s", "http://h"]);
        match args.command {
            Command::Watch { interval, .. } => assert_eq!(interval, Duration::from_secs(10)),
            other => panic!("unexpected command {other:?}"),
        }
        assert!(Args::try_parse_from(["kubemirror", "watch", "--interval", "nope", "http://h"])
            .is_err());
    }

    #[test]
    fn completion_requires_a_known_shell() {
        assert!(Args::try_parse_from(["kubemirror", "completion", "fish"]).is_err());
        let args = Args::parse_from(["kubemirror", "completion", "zsh"]);
        match args.command {
            Command::Completion { shell, .. } => assert_eq!(shell, Shell::Zsh),
            other => panic!("unexpected command {other:?}"),
        }
    }
}
