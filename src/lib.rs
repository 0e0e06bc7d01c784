//! Thread-safe reactive holders.
//!
//! A [Holder] is a slot for a value which may not exist yet. Consumers either block on it with
//! [Holder::get] or [Holder::follow] it, and derive new holders from it with `map`, `combine`,
//! `unpack`, `when`... which stay up to date whenever a source is [Holder::set].
//!
//! Propagation is synchronous: `set` calls every follower, including derived holders, on the
//! calling thread, and returns once the whole dependent graph is up to date. Concurrent `set`s and
//! `follow`s on one holder are serialized, so a follower never misses nor sees twice a value.
//!
//! [CollectionHolder]s hold a whole list ([ListHolder]), set ([SetHolder]) or map ([MapHolder]),
//! and also report fine-grained changes to incremental followers.
//!
//! Derived holders keep their sources alive, never the other way around. When application code
//! drops every handle on a derived holder, its sources drop their follower on their next change.
//! See [Anchor] to tie a follower's lifetime to some other object.

pub(crate) mod uid;
pub(crate) mod error;
pub(crate) mod lifecycle;
pub(crate) mod holder;
pub(crate) mod derive;
pub(crate) mod numbers;
pub(crate) mod collection;

pub use uid::*;
pub use error::*;
pub use lifecycle::Anchor;
pub use holder::{Absent, Generation, Holdable, Holder, HolderBuilder, Publish};
pub use numbers::BoolHolder;
pub use collection::*;
pub use indexmap::{IndexMap, IndexSet};
