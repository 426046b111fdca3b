// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

mod cli;
mod daemon;
mod kubeconfig;
mod kubernetes;
mod mirror;

use anyhow::Result;
use clap::Parser;

use cli::{Args, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        "kubemirror=debug"
    } else {
        "kubemirror=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match &args.command {
        Command::Watch {
            interval,
            only,
            urls,
        } => cli::watch::run(&args, *interval, only, urls).await,
        Command::Get {
            kubectl_flags,
            resource,
        } => cli::get::run(&args, kubectl_flags, resource.as_deref()).await,
        Command::Completion {
            shell,
            kubectl_alias,
            mirror_path,
        } => cli::completion::run(&args, *shell, kubectl_alias, mirror_path),
        Command::Version => {
            println!("kubemirror-{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
