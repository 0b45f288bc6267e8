use crate::property::{PropertyDescriptor, PropertyKey};
use crate::{GcObject, HeapId, Owner, RootId, Value, WorldError};
use ahash::HashSet;
use ahash::HashSetExt;
use core::mem;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;
use tracing::debug_span;

/// Hard upper bound for prototype chain traversals.
///
/// `object_set_prototype` prevents cycles, but a chain can still be made arbitrarily long one
/// allocation at a time.
pub const MAX_PROTOTYPE_CHAIN: usize = 10_000;

/// Heap configuration and memory limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeapLimits {
  /// Hard limit for accounted live bytes (object headers plus property entries).
  pub max_bytes: usize,
}

impl HeapLimits {
  /// Creates a new set of heap limits.
  pub fn new(max_bytes: usize) -> Self {
    Self { max_bytes }
  }
}

impl Default for HeapLimits {
  fn default() -> Self {
    Self::new(64 * 1024 * 1024)
  }
}

/// A shared, non-moving mark/sweep object heap.
///
/// Objects live in a table of slots. [`GcObject`] handles store the slot `index` and a per-slot
/// `generation`, which makes handles stable while the table grows and lets stale handles be
/// detected once a slot is reused.
///
/// The heap is `Sync`: property operations take `&Heap` and may run on many threads at once.
/// Every object record has its own read/write lock; see the crate documentation for the lock
/// ordering rules. Collection takes `&mut Heap`, so it never overlaps with other operations.
pub struct Heap {
  limits: HeapLimits,

  /// Accounted bytes used by live objects.
  used_bytes: AtomicUsize,
  gc_runs: u64,

  table: RwLock<SlotTable>,
  roots: Mutex<RootTable>,

  /// Serializes prototype mutations so two concurrent updates cannot race into a cycle.
  prototype_lock: Mutex<()>,
}

#[derive(Default)]
struct SlotTable {
  slots: Vec<Slot>,
  free_list: Vec<u32>,
}

impl SlotTable {
  fn validate(&self, id: HeapId) -> Option<usize> {
    let idx = id.index() as usize;
    let slot = self.slots.get(idx)?;
    if slot.generation != id.generation() || slot.object.is_none() {
      return None;
    }
    Some(idx)
  }
}

struct Slot {
  generation: u32,
  object: Option<Arc<RwLock<JsObject>>>,
}

#[derive(Default)]
struct RootTable {
  values: Vec<Option<Value>>,
  free: Vec<u32>,
}

impl Heap {
  /// Creates a new heap with the provided memory limits.
  pub fn new(limits: HeapLimits) -> Self {
    Self {
      limits,
      used_bytes: AtomicUsize::new(0),
      gc_runs: 0,
      table: RwLock::new(SlotTable::default()),
      roots: Mutex::new(RootTable::default()),
      prototype_lock: Mutex::new(()),
    }
  }

  pub fn limits(&self) -> HeapLimits {
    self.limits
  }

  /// Accounted bytes currently used by live objects.
  pub fn used_bytes(&self) -> usize {
    self.used_bytes.load(Ordering::Relaxed)
  }

  /// Total number of GC cycles that have run.
  pub fn gc_runs(&self) -> u64 {
    self.gc_runs
  }

  /// Number of currently allocated objects (live or not yet collected).
  pub fn object_count(&self) -> usize {
    let table = self.table.read();
    table.slots.len() - table.free_list.len()
  }

  pub(crate) fn reserve_bytes(&self, bytes: usize) -> Result<(), WorldError> {
    let max = self.limits.max_bytes;
    self
      .used_bytes
      .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |used| {
        used.checked_add(bytes).filter(|next| *next <= max)
      })
      .map(|_| ())
      .map_err(|_| WorldError::OutOfMemory)
  }

  pub(crate) fn release_bytes(&self, bytes: usize) {
    let _ = self
      .used_bytes
      .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |used| {
        Some(used.saturating_sub(bytes))
      });
  }

  /// Allocates an empty object owned by `owner` whose parent is `prototype` (`None` for the
  /// terminal null).
  pub fn alloc_object(
    &self,
    owner: Option<Owner>,
    prototype: Option<GcObject>,
  ) -> Result<GcObject, WorldError> {
    if let Some(proto) = prototype {
      if !self.is_valid_object(proto) {
        return Err(WorldError::InvalidHandle);
      }
    }

    let bytes = JsObject::heap_size_bytes_for_property_count(0);
    self.reserve_bytes(bytes)?;

    let record = Arc::new(RwLock::new(JsObject::new(owner, prototype)));
    let mut table = self.table.write();
    let id = match table.free_list.pop() {
      Some(idx) => {
        let slot = &mut table.slots[idx as usize];
        debug_assert!(slot.object.is_none());
        slot.object = Some(record);
        HeapId::from_parts(idx, slot.generation)
      }
      None => {
        let idx = table.slots.len() as u32;
        table.slots.push(Slot {
          generation: 0,
          object: Some(record),
        });
        HeapId::from_parts(idx, 0)
      }
    };
    Ok(GcObject(id))
  }

  /// Resolves `obj` to its record. The slot table lock is released before this returns, so the
  /// caller may lock the record without holding any heap-wide lock.
  pub(crate) fn record(&self, obj: GcObject) -> Result<Arc<RwLock<JsObject>>, WorldError> {
    let table = self.table.read();
    let idx = table.validate(obj.0).ok_or(WorldError::InvalidHandle)?;
    table.slots[idx]
      .object
      .clone()
      .ok_or(WorldError::InvalidHandle)
  }

  /// Returns `true` if `obj` currently points to a live object allocation.
  pub fn is_valid_object(&self, obj: GcObject) -> bool {
    self.table.read().validate(obj.0).is_some()
  }

  /// Gets an object's parent (`None` is the terminal null).
  pub fn object_prototype(&self, obj: GcObject) -> Result<Option<GcObject>, WorldError> {
    Ok(self.record(obj)?.read().prototype)
  }

  /// Replaces an object's parent.
  ///
  /// Rejects direct and indirect cycles. The new chain is validated before `obj` is locked, and
  /// prototype mutations are serialized heap-wide, so the check cannot be invalidated by a
  /// concurrent mutation.
  pub fn object_set_prototype(
    &self,
    obj: GcObject,
    prototype: Option<GcObject>,
  ) -> Result<(), WorldError> {
    let _serial = self.prototype_lock.lock();

    // Validate `obj` early so we don't silently accept stale handles.
    let record = self.record(obj)?;

    let mut current = prototype;
    let mut steps = 0usize;
    let mut visited: HashSet<GcObject> = HashSet::new();
    while let Some(p) = current {
      if steps >= MAX_PROTOTYPE_CHAIN {
        return Err(WorldError::PrototypeChainTooDeep);
      }
      steps += 1;

      if p == obj || !visited.insert(p) {
        return Err(WorldError::PrototypeCycle);
      }
      current = self.object_prototype(p)?;
    }

    record.write().prototype = prototype;
    Ok(())
  }

  /// The principal that created `obj`; `None` for realm intrinsics.
  pub fn object_owner(&self, obj: GcObject) -> Result<Option<Owner>, WorldError> {
    Ok(self.record(obj)?.read().owner.clone())
  }

  /// Reads the reserved object-level flag. No operation in this crate gives it meaning.
  pub fn object_reserved_flag(&self, obj: GcObject) -> Result<bool, WorldError> {
    Ok(self.record(obj)?.read().reserved)
  }

  pub fn object_set_reserved_flag(&self, obj: GcObject, flag: bool) -> Result<(), WorldError> {
    self.record(obj)?.write().reserved = flag;
    Ok(())
  }

  /// Gets an own property descriptor, without permission checks.
  ///
  /// This is a host-level introspection API (persistence, tooling). Scripts should go through
  /// [`Heap::get_property`].
  pub fn get_own_property(
    &self,
    obj: GcObject,
    key: &PropertyKey,
  ) -> Result<Option<PropertyDescriptor>, WorldError> {
    Ok(self.record(obj)?.read().get(key).cloned())
  }

  /// Own property names, in insertion order.
  pub fn own_property_keys(&self, obj: GcObject) -> Result<Vec<PropertyKey>, WorldError> {
    let record = self.record(obj)?;
    let record = record.read();
    Ok(record.properties.iter().map(|p| p.key.clone()).collect())
  }

  /// Adds a persistent root, keeping `value` (and everything reachable from it) live until the
  /// returned [`RootId`] is removed.
  pub fn add_root(&self, value: Value) -> RootId {
    let mut roots = self.roots.lock();
    let idx = match roots.free.pop() {
      Some(idx) => idx as usize,
      None => {
        roots.values.push(None);
        roots.values.len() - 1
      }
    };
    debug_assert!(roots.values[idx].is_none());
    roots.values[idx] = Some(value);
    RootId(idx as u32)
  }

  /// Returns the current value of a persistent root.
  pub fn get_root(&self, id: RootId) -> Option<Value> {
    self
      .roots
      .lock()
      .values
      .get(id.0 as usize)
      .and_then(|slot| slot.clone())
  }

  /// Updates a persistent root's value. Unknown or removed ids are ignored.
  pub fn set_root(&self, id: RootId, value: Value) {
    let mut roots = self.roots.lock();
    if let Some(slot @ Some(_)) = roots.values.get_mut(id.0 as usize) {
      *slot = Some(value);
    }
  }

  /// Removes a persistent root previously created by [`Heap::add_root`].
  pub fn remove_root(&self, id: RootId) {
    let mut roots = self.roots.lock();
    let idx = id.0 as usize;
    debug_assert!(idx < roots.values.len(), "invalid RootId");
    if let Some(slot) = roots.values.get_mut(idx) {
      if slot.take().is_some() {
        roots.free.push(id.0);
      }
    }
  }

  /// Explicitly runs a GC cycle, freeing every object not reachable from a persistent root.
  ///
  /// Freed slots get a new generation, so outstanding handles to them report
  /// [`WorldError::InvalidHandle`].
  pub fn collect_garbage(&mut self) {
    let _span = debug_span!("collect_garbage", run = self.gc_runs + 1).entered();
    self.gc_runs += 1;

    let table = self.table.get_mut();
    let mut marks = vec![false; table.slots.len()];

    // Mark.
    {
      let mut tracer = Tracer {
        table: &*table,
        marks: &mut marks,
        worklist: Vec::new(),
      };
      for value in self.roots.get_mut().values.iter().flatten() {
        tracer.trace_value(value);
      }
      while let Some(idx) = tracer.worklist.pop() {
        let Some(record) = tracer.table.slots[idx].object.clone() else {
          debug_assert!(false, "marked a free slot: {idx}");
          continue;
        };
        record.read().trace(&mut tracer);
      }
    }

    // Sweep.
    let mut freed = 0usize;
    let mut freed_bytes = 0usize;
    for (idx, slot) in table.slots.iter_mut().enumerate() {
      if marks[idx] {
        continue;
      }
      let Some(record) = slot.object.take() else {
        continue;
      };
      freed += 1;
      freed_bytes += record.read().heap_size_bytes();
      slot.generation = slot.generation.wrapping_add(1);
      table.free_list.push(idx as u32);
    }
    let used = self.used_bytes.get_mut();
    *used = used.saturating_sub(freed_bytes);

    debug!(
      freed,
      freed_bytes,
      live = table.slots.len() - table.free_list.len(),
      "collected garbage"
    );
  }
}

impl Default for Heap {
  fn default() -> Self {
    Self::new(HeapLimits::default())
  }
}

/// An object record: parent link, owner, reserved flag and property table.
#[derive(Debug)]
pub(crate) struct JsObject {
  pub(crate) prototype: Option<GcObject>,
  pub(crate) owner: Option<Owner>,
  pub(crate) reserved: bool,
  pub(crate) properties: Vec<PropertyEntry>,
}

impl JsObject {
  fn new(owner: Option<Owner>, prototype: Option<GcObject>) -> Self {
    Self {
      prototype,
      owner,
      reserved: false,
      properties: Vec::new(),
    }
  }

  /// Whether `actor` may add names that exist nowhere on this object's chain. Ownerless objects
  /// only accept new names from privileged principals.
  pub(crate) fn can_extend(&self, actor: &Owner) -> bool {
    actor.is_privileged() || self.owner.as_ref() == Some(actor)
  }

  pub(crate) fn position(&self, key: &PropertyKey) -> Option<usize> {
    self.properties.iter().position(|p| p.key == *key)
  }

  pub(crate) fn get(&self, key: &PropertyKey) -> Option<&PropertyDescriptor> {
    self.properties.iter().find(|p| p.key == *key).map(|p| &p.desc)
  }

  pub(crate) fn get_mut(&mut self, key: &PropertyKey) -> Option<&mut PropertyDescriptor> {
    self
      .properties
      .iter_mut()
      .find(|p| p.key == *key)
      .map(|p| &mut p.desc)
  }

  fn heap_size_bytes(&self) -> usize {
    Self::heap_size_bytes_for_property_count(self.properties.len())
  }

  pub(crate) fn heap_size_bytes_for_property_count(count: usize) -> usize {
    count
      .checked_mul(PropertyEntry::HEAP_SIZE_BYTES)
      .and_then(|props| mem::size_of::<Self>().checked_add(props))
      .unwrap_or(usize::MAX)
  }
}

#[derive(Debug, Clone)]
pub(crate) struct PropertyEntry {
  pub(crate) key: PropertyKey,
  pub(crate) desc: PropertyDescriptor,
}

impl PropertyEntry {
  pub(crate) const HEAP_SIZE_BYTES: usize = mem::size_of::<PropertyEntry>();
}

pub(crate) trait Trace {
  fn trace(&self, tracer: &mut Tracer<'_>);
}

impl Trace for JsObject {
  fn trace(&self, tracer: &mut Tracer<'_>) {
    if let Some(proto) = self.prototype {
      tracer.trace_object(proto);
    }
    for prop in self.properties.iter() {
      prop.desc.trace(tracer);
    }
  }
}

impl Trace for PropertyDescriptor {
  fn trace(&self, tracer: &mut Tracer<'_>) {
    // Owners are identities, not heap allocations.
    tracer.trace_value(&self.value);
  }
}

pub(crate) struct Tracer<'a> {
  table: &'a SlotTable,
  marks: &'a mut [bool],
  worklist: Vec<usize>,
}

impl<'a> Tracer<'a> {
  pub(crate) fn trace_value(&mut self, value: &Value) {
    if let Value::Object(obj) = value {
      self.trace_object(*obj);
    }
  }

  fn trace_object(&mut self, obj: GcObject) {
    let Some(idx) = self.table.validate(obj.0) else {
      debug_assert!(false, "stale handle during GC: {obj:?}");
      return;
    };
    if self.marks[idx] {
      return;
    }
    self.marks[idx] = true;
    self.worklist.push(idx);
  }
}
