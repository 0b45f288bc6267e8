//! Persistence shape of a heap.
//!
//! A [`HeapSnapshot`] is plain data: principals, every object reachable from a set of named roots,
//! and the roots themselves. Objects refer to each other by index into
//! [`HeapSnapshot::objects`], so shared references and prototype links survive a round trip.
//! The encoding is up to the caller; the types implement `serde`'s traits.

use crate::heap::PropertyEntry;
use crate::property::{PropertyDescriptor, PropertyKey};
use crate::{GcObject, Heap, JsString, Owner, Principals, Value, WorldError};
use ahash::{HashMap, HashMapExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, debug_span};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeapSnapshot {
  pub principals: Vec<PrincipalRecord>,
  pub objects: Vec<ObjectRecord>,
  pub roots: BTreeMap<String, SnapshotValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalRecord {
  pub id: u64,
  pub name: String,
  #[serde(default)]
  pub privileged: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
  /// Principal id; `None` for realm intrinsics.
  pub owner: Option<u64>,
  /// Index of the parent object; `None` is the terminal null.
  pub parent: Option<usize>,
  #[serde(default)]
  pub reserved: bool,
  pub properties: Vec<PropertyRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyRecord {
  pub name: String,
  pub owner: u64,
  pub value: SnapshotValue,
  pub readable: bool,
  pub enumerable: bool,
  pub inherit: bool,
}

/// A [`Value`] with object handles replaced by object indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum SnapshotValue {
  Undefined,
  Null,
  Bool(bool),
  Number(#[serde(with = "number")] f64),
  String(String),
  Object(usize),
}

/// Numbers are written as plain numbers when finite. Text encodings such as JSON have no literal
/// for the non-finite values, so those are written as strings.
mod number {
  use serde::{Deserialize, Deserializer, Serialize, Serializer};

  #[derive(Serialize, Deserialize)]
  #[serde(untagged)]
  enum Repr {
    Finite(f64),
    NonFinite(NonFinite),
  }

  #[derive(Serialize, Deserialize)]
  enum NonFinite {
    NaN,
    Infinity,
    #[serde(rename = "-Infinity")]
    NegativeInfinity,
  }

  pub fn serialize<S: Serializer>(n: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    let repr = if n.is_nan() {
      Repr::NonFinite(NonFinite::NaN)
    } else if *n == f64::INFINITY {
      Repr::NonFinite(NonFinite::Infinity)
    } else if *n == f64::NEG_INFINITY {
      Repr::NonFinite(NonFinite::NegativeInfinity)
    } else {
      Repr::Finite(*n)
    };
    repr.serialize(serializer)
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(match Repr::deserialize(deserializer)? {
      Repr::Finite(n) => n,
      Repr::NonFinite(NonFinite::NaN) => f64::NAN,
      Repr::NonFinite(NonFinite::Infinity) => f64::INFINITY,
      Repr::NonFinite(NonFinite::NegativeInfinity) => f64::NEG_INFINITY,
    })
  }
}

/// Assigns snapshot indices to objects in discovery order.
struct Indexer {
  indices: HashMap<GcObject, usize>,
  queue: VecDeque<GcObject>,
}

impl Indexer {
  fn index_of(&mut self, obj: GcObject) -> usize {
    if let Some(idx) = self.indices.get(&obj) {
      return *idx;
    }
    let idx = self.indices.len();
    self.indices.insert(obj, idx);
    self.queue.push_back(obj);
    idx
  }

  fn value(&mut self, value: &Value) -> SnapshotValue {
    match value {
      Value::Undefined => SnapshotValue::Undefined,
      Value::Null => SnapshotValue::Null,
      Value::Bool(b) => SnapshotValue::Bool(*b),
      Value::Number(n) => SnapshotValue::Number(*n),
      Value::String(s) => SnapshotValue::String(s.as_str().to_string()),
      Value::Object(obj) => SnapshotValue::Object(self.index_of(*obj)),
    }
  }
}

fn registered(principals: &Principals, owner: &Owner) -> Result<u64, WorldError> {
  match principals.get(owner.id()) {
    Some(found) if found == *owner => Ok(owner.id()),
    _ => Err(WorldError::Snapshot(format!(
      "owner {owner} is not registered with the given principals"
    ))),
  }
}

impl Heap {
  /// Captures every object reachable from `roots`.
  ///
  /// All principals in `principals` are recorded, whether or not anything references them. Every
  /// owner found in the graph must belong to `principals`.
  pub fn snapshot(
    &self,
    principals: &Principals,
    roots: &BTreeMap<String, Value>,
  ) -> Result<HeapSnapshot, WorldError> {
    let _span = debug_span!("snapshot", roots = roots.len()).entered();

    let mut indexer = Indexer {
      indices: HashMap::new(),
      queue: VecDeque::new(),
    };
    let roots = roots
      .iter()
      .map(|(name, value)| (name.clone(), indexer.value(value)))
      .collect();

    let mut objects = Vec::new();
    while let Some(obj) = indexer.queue.pop_front() {
      let record = self.record(obj)?;
      let record = record.read();
      let owner = record
        .owner
        .as_ref()
        .map(|owner| registered(principals, owner))
        .transpose()?;
      let parent = record.prototype.map(|proto| indexer.index_of(proto));
      let mut properties = Vec::with_capacity(record.properties.len());
      for prop in record.properties.iter() {
        properties.push(PropertyRecord {
          name: prop.key.as_str().to_string(),
          owner: registered(principals, &prop.desc.owner)?,
          value: indexer.value(&prop.desc.value),
          readable: prop.desc.readable,
          enumerable: prop.desc.enumerable,
          inherit: prop.desc.inherit,
        });
      }
      objects.push(ObjectRecord {
        owner,
        parent,
        reserved: record.reserved,
        properties,
      });
    }

    let principals: Vec<PrincipalRecord> = principals
      .all()
      .into_iter()
      .map(|owner| PrincipalRecord {
        id: owner.id(),
        name: owner.name().to_string(),
        privileged: owner.is_privileged(),
      })
      .collect();

    debug!(
      objects = objects.len(),
      principals = principals.len(),
      "captured snapshot"
    );
    Ok(HeapSnapshot {
      principals,
      objects,
      roots,
    })
  }

  /// Rebuilds a snapshot's objects in this heap and returns its named roots.
  ///
  /// Principals are interned into `principals`, so ids already registered keep their identity.
  /// The returned roots are not registered with the heap; root whatever must survive the next
  /// collection. On error, objects allocated so far are left unreachable for the collector.
  pub fn restore(
    &self,
    snapshot: &HeapSnapshot,
    principals: &Principals,
  ) -> Result<BTreeMap<String, Value>, WorldError> {
    let _span = debug_span!("restore", objects = snapshot.objects.len()).entered();

    let mut owners: HashMap<u64, Owner> = HashMap::with_capacity(snapshot.principals.len());
    for p in snapshot.principals.iter() {
      owners.insert(p.id, principals.intern(p.id, &p.name, p.privileged)?);
    }
    let owner = |id: u64| -> Result<Owner, WorldError> {
      owners
        .get(&id)
        .cloned()
        .ok_or(WorldError::UnknownPrincipal(id))
    };

    let mut handles = Vec::with_capacity(snapshot.objects.len());
    for record in snapshot.objects.iter() {
      let obj_owner = record.owner.map(&owner).transpose()?;
      handles.push(self.alloc_object(obj_owner, None)?);
    }
    let handle = |idx: usize| -> Result<GcObject, WorldError> {
      handles
        .get(idx)
        .copied()
        .ok_or_else(|| WorldError::Snapshot(format!("object index {idx} out of range")))
    };
    let value = |v: &SnapshotValue| -> Result<Value, WorldError> {
      Ok(match v {
        SnapshotValue::Undefined => Value::Undefined,
        SnapshotValue::Null => Value::Null,
        SnapshotValue::Bool(b) => Value::Bool(*b),
        SnapshotValue::Number(n) => Value::Number(*n),
        SnapshotValue::String(s) => Value::String(JsString::new(s)),
        SnapshotValue::Object(idx) => Value::Object(handle(*idx)?),
      })
    };

    for (idx, record) in snapshot.objects.iter().enumerate() {
      let obj = handles[idx];
      if let Some(parent) = record.parent {
        self.object_set_prototype(obj, Some(handle(parent)?))?;
      }

      let mut entries = Vec::with_capacity(record.properties.len());
      for prop in record.properties.iter() {
        let key = PropertyKey::new(&prop.name);
        if entries.iter().any(|e: &PropertyEntry| e.key == key) {
          return Err(WorldError::Snapshot(format!(
            "object {idx} has duplicate property '{key}'"
          )));
        }
        entries.push(PropertyEntry {
          key,
          desc: PropertyDescriptor {
            owner: owner(prop.owner)?,
            value: value(&prop.value)?,
            readable: prop.readable,
            enumerable: prop.enumerable,
            inherit: prop.inherit,
          },
        });
      }
      self.reserve_bytes(entries.len().saturating_mul(PropertyEntry::HEAP_SIZE_BYTES))?;

      let target = self.record(obj)?;
      let mut target = target.write();
      target.reserved = record.reserved;
      target.properties = entries;
    }

    let roots = snapshot
      .roots
      .iter()
      .map(|(name, v)| Ok((name.clone(), value(v)?)))
      .collect::<Result<BTreeMap<_, _>, WorldError>>()?;
    debug!(objects = handles.len(), roots = roots.len(), "restored snapshot");
    Ok(roots)
  }
}
