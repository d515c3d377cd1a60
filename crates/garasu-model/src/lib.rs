//! Entity building blocks for garasu.
//!
//! Entities compose their column lists from the blocks in this crate:
//!
//! - [`SurrogatePk`]: a `CHAR(10)` primary key filled by [`guid`].
//! - [`Slug`]: a unique, URL-safe `slug` column derived with [`slugify`].
//! - [`Followers`]: view and rating counters.
//!
//! [`serialize`](mod@serialize) converts entity graphs into JSON, loading
//! [`Related`] / [`RelatedMany`] relations on demand.

pub mod identity;
pub mod popularity;
pub mod relation;
pub mod serialize;
pub mod slug;
pub mod time;

pub use identity::{GUID_LENGTH, ID_COLUMN, SurrogatePk, guid, guid_unique_by};
pub use popularity::Followers;
pub use relation::{RelationLoader, Related, RelatedMany};
pub use serialize::{
    Attr, MAX_DEPTH, RESERVED_PREFIX, Serializable, SerializeContext, render_json, serialize,
};
pub use slug::{SLUG_COLUMN, SLUG_MAX_LENGTH, Slug, slugify};
pub use time::{as_utc, utc_tz};
