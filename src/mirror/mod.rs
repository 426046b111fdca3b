//! The mirror cache and its resource model.

mod cache;
mod resource;

pub use cache::{MirrorCache, QueryError};
pub use resource::{
    EventKind, Kind, ObjectEvent, ObjectMeta, RawObject, Resource, ResourceFilter, WatchEvent,
};
