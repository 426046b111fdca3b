mod client;
mod ingest;

pub use client::{HttpUpstreamClient, UpstreamClient, UpstreamError};
pub use ingest::{spawn_poll, spawn_watch, spawn_workers, KindSelection};
