//! Permission-aware prototype object model for shared, multi-user JavaScript worlds.
//!
//! Many principals' code reads and mutates one long-lived object graph. This crate provides:
//! - A non-moving mark/sweep GC heap ([`Heap`]) with generation-checked handles ([`GcObject`])
//! - Single-inheritance prototype chains, walked nearest-first
//! - Per-property ownership and read/enumerate/inherit bits ([`PropertyDescriptor`]), checked on
//!   every read and write against the acting principal ([`Owner`])
//! - Installed built-in prototypes and the value-level property protocol ([`Realm`])
//! - A serializable persistence shape ([`HeapSnapshot`])
//!
//! # Permissions
//!
//! A read of `name` is resolved against the *nearest* descriptor for `name` on the receiver's
//! chain. It succeeds if that descriptor is world-readable, owned by the actor, or the actor is
//! privileged. A write needs the actor to own the nearest descriptor (or be privileged). Writing
//! an inherited name creates a local descriptor on the receiver; ancestors are never modified.
//! A name found nowhere reads as `undefined`. Creating it needs write access to the receiver
//! itself: the actor must own the object or be privileged, and ownerless objects such as the
//! built-in prototypes accept new names from privileged principals only.
//!
//! # Rooting and handle validity
//!
//! A [`GcObject`] holds `{ index, generation }`. The `generation` is incremented every time its
//! slot is freed, so a handle to a collected object reports [`WorldError::InvalidHandle`] instead
//! of aliasing a newer allocation. The collector traces from persistent roots managed by
//! [`Heap::add_root`] / [`Heap::remove_root`]; anything not reachable from them is freed by
//! [`Heap::collect_garbage`].
//!
//! # Concurrency
//!
//! [`Heap`] is `Sync` and property operations take `&Heap`. Each object has its own read/write
//! lock. Locks are always taken from a receiver toward the root of its chain:
//! - reads hold at most one object lock at a time;
//! - writes hold the receiver's write lock while read-locking its ancestors one by one;
//! - prototype changes are serialized and validate the new chain before locking the target.
//!
//! Collection needs `&mut Heap`, so it never runs concurrently with anything else.

mod error;
mod handle;
mod heap;
mod object_ops;
mod owner;
mod property;
mod realm;
mod snapshot;
mod string;
mod value;

pub use crate::error::Access;
pub use crate::error::ErrorKind;
pub use crate::error::WorldError;
pub use crate::handle::GcObject;
pub use crate::handle::HeapId;
pub use crate::handle::RootId;
pub use crate::heap::Heap;
pub use crate::heap::HeapLimits;
pub use crate::heap::MAX_PROTOTYPE_CHAIN;
pub use crate::owner::Owner;
pub use crate::owner::Principals;
pub use crate::property::PropertyAttributesPatch;
pub use crate::property::PropertyDescriptor;
pub use crate::property::PropertyKey;
pub use crate::realm::Realm;
pub use crate::realm::BOOLEAN_PROTOTYPE;
pub use crate::realm::NUMBER_PROTOTYPE;
pub use crate::realm::OBJECT_PROTOTYPE;
pub use crate::realm::STRING_PROTOTYPE;
pub use crate::snapshot::HeapSnapshot;
pub use crate::snapshot::ObjectRecord;
pub use crate::snapshot::PrincipalRecord;
pub use crate::snapshot::PropertyRecord;
pub use crate::snapshot::SnapshotValue;
pub use crate::string::JsString;
pub use crate::value::Value;
