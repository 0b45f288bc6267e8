use crate::property::PropertyKey;
use crate::{GcObject, Heap, Owner, RootId, Value, WorldError};
use std::collections::BTreeMap;

/// Well-known root names used by [`Realm::roots`] and [`Realm::from_roots`].
pub const OBJECT_PROTOTYPE: &str = "Object.prototype";
pub const BOOLEAN_PROTOTYPE: &str = "Boolean.prototype";
pub const NUMBER_PROTOTYPE: &str = "Number.prototype";
pub const STRING_PROTOTYPE: &str = "String.prototype";

/// The installed built-in prototypes, and the value-level property protocol that needs them.
///
/// Primitive values have no property table of their own; reads on them delegate to the shared
/// prototype for their kind. This type owns a set of **persistent GC roots** registered with the
/// [`Heap`]. Call [`Realm::teardown`] to unregister them when the embedding is finished with the
/// realm.
#[derive(Debug)]
pub struct Realm {
  object_prototype: GcObject,
  boolean_prototype: GcObject,
  number_prototype: GcObject,
  string_prototype: GcObject,
  roots: Vec<RootId>,
  torn_down: bool,
}

impl Realm {
  /// Installs the built-in prototypes on `heap`.
  ///
  /// `Object.prototype` has a null parent and an empty table; the primitive prototypes inherit from
  /// it. None of them has an owner, so only privileged principals can add names to them.
  pub fn new(heap: &Heap) -> Result<Self, WorldError> {
    let object_prototype = heap.alloc_object(None, None)?;
    let boolean_prototype = heap.alloc_object(None, Some(object_prototype))?;
    let number_prototype = heap.alloc_object(None, Some(object_prototype))?;
    let string_prototype = heap.alloc_object(None, Some(object_prototype))?;
    Ok(Self::rooted(
      heap,
      object_prototype,
      boolean_prototype,
      number_prototype,
      string_prototype,
    ))
  }

  fn rooted(
    heap: &Heap,
    object_prototype: GcObject,
    boolean_prototype: GcObject,
    number_prototype: GcObject,
    string_prototype: GcObject,
  ) -> Self {
    let roots = [
      object_prototype,
      boolean_prototype,
      number_prototype,
      string_prototype,
    ]
    .into_iter()
    .map(|obj| heap.add_root(Value::Object(obj)))
    .collect();
    Self {
      object_prototype,
      boolean_prototype,
      number_prototype,
      string_prototype,
      roots,
      torn_down: false,
    }
  }

  /// Rebuilds a realm from named roots, e.g. those returned by
  /// [`Heap::restore`](crate::Heap::restore).
  pub fn from_roots(heap: &Heap, roots: &BTreeMap<String, Value>) -> Result<Self, WorldError> {
    let get = |name: &str| -> Result<GcObject, WorldError> {
      roots
        .get(name)
        .and_then(Value::as_object)
        .filter(|obj| heap.is_valid_object(*obj))
        .ok_or_else(|| WorldError::Snapshot(format!("missing intrinsic root '{name}'")))
    };
    Ok(Self::rooted(
      heap,
      get(OBJECT_PROTOTYPE)?,
      get(BOOLEAN_PROTOTYPE)?,
      get(NUMBER_PROTOTYPE)?,
      get(STRING_PROTOTYPE)?,
    ))
  }

  /// The intrinsics as named roots, suitable for [`Heap::snapshot`](crate::Heap::snapshot).
  pub fn roots(&self) -> BTreeMap<String, Value> {
    [
      (OBJECT_PROTOTYPE, self.object_prototype),
      (BOOLEAN_PROTOTYPE, self.boolean_prototype),
      (NUMBER_PROTOTYPE, self.number_prototype),
      (STRING_PROTOTYPE, self.string_prototype),
    ]
    .into_iter()
    .map(|(name, obj)| (name.to_string(), Value::Object(obj)))
    .collect()
  }

  pub fn object_prototype(&self) -> GcObject {
    self.object_prototype
  }

  pub fn boolean_prototype(&self) -> GcObject {
    self.boolean_prototype
  }

  pub fn number_prototype(&self) -> GcObject {
    self.number_prototype
  }

  pub fn string_prototype(&self) -> GcObject {
    self.string_prototype
  }

  /// Allocates a plain object owned by `owner` whose parent is `Object.prototype`.
  pub fn alloc_object(&self, heap: &Heap, owner: &Owner) -> Result<GcObject, WorldError> {
    heap.alloc_object(Some(owner.clone()), Some(self.object_prototype))
  }

  /// The prototype a lookup on `value` continues at: an object's parent (`Null` at the end of
  /// the chain), or the shared prototype of a primitive's kind. `undefined` and `null` have no
  /// parent.
  pub fn parent(&self, heap: &Heap, value: &Value) -> Result<Option<Value>, WorldError> {
    Ok(match value {
      Value::Undefined | Value::Null => None,
      Value::Bool(_) => Some(Value::Object(self.boolean_prototype)),
      Value::Number(_) => Some(Value::Object(self.number_prototype)),
      Value::String(_) => Some(Value::Object(self.string_prototype)),
      Value::Object(obj) => Some(
        heap
          .object_prototype(*obj)?
          .map_or(Value::Null, Value::Object),
      ),
    })
  }

  /// Reads `key` from any receiver value as `actor`.
  pub fn get_property(
    &self,
    heap: &Heap,
    receiver: &Value,
    key: &PropertyKey,
    actor: &Owner,
  ) -> Result<Value, WorldError> {
    let start = match receiver {
      Value::Undefined => {
        return Err(WorldError::InvalidReceiver(
          "cannot read properties of undefined",
        ))
      }
      Value::Null => {
        return Err(WorldError::InvalidReceiver(
          "cannot read properties of null",
        ))
      }
      Value::Object(obj) => *obj,
      Value::Bool(_) => self.boolean_prototype,
      Value::Number(_) => self.number_prototype,
      Value::String(_) => self.string_prototype,
    };
    heap.get_property(start, key, actor)
  }

  /// Writes `key` on any receiver value as `actor`. Only objects carry writable properties.
  pub fn set_property(
    &self,
    heap: &Heap,
    receiver: &Value,
    key: &PropertyKey,
    value: Value,
    actor: &Owner,
  ) -> Result<(), WorldError> {
    match receiver {
      Value::Object(obj) => heap.set_property(*obj, key, value, actor),
      Value::Undefined => Err(WorldError::InvalidReceiver(
        "cannot set properties of undefined",
      )),
      Value::Null => Err(WorldError::InvalidReceiver(
        "cannot set properties of null",
      )),
      Value::Bool(_) | Value::Number(_) | Value::String(_) => Err(WorldError::InvalidReceiver(
        "primitive values have no own properties",
      )),
    }
  }

  /// Unregisters the realm's persistent roots. Idempotent.
  pub fn teardown(&mut self, heap: &Heap) {
    if self.torn_down {
      return;
    }
    for root in self.roots.drain(..) {
      heap.remove_root(root);
    }
    self.torn_down = true;
  }
}
