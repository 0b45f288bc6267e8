use crate::error::Access;
use crate::heap::{JsObject, PropertyEntry, MAX_PROTOTYPE_CHAIN};
use crate::property::{PropertyAttributesPatch, PropertyDescriptor, PropertyKey};
use crate::{GcObject, Heap, Owner, Value, WorldError};
use ahash::HashSet;
use ahash::HashSetExt;
use tracing::{debug, trace};

fn deny(access: Access, key: &PropertyKey, actor: &Owner) -> WorldError {
  debug!(
    target: "world_js::access",
    principal = %actor,
    key = %key,
    %access,
    "permission denied"
  );
  WorldError::permission_denied(access, key, actor)
}

impl Heap {
  /// Finds the nearest descriptor for `key`, starting at `start` and walking toward the root.
  ///
  /// Each record is read-locked only while it is inspected.
  fn find_property(
    &self,
    start: Option<GcObject>,
    key: &PropertyKey,
  ) -> Result<Option<(GcObject, PropertyDescriptor)>, WorldError> {
    let mut current = start;
    let mut steps = 0usize;
    while let Some(obj) = current {
      if steps >= MAX_PROTOTYPE_CHAIN {
        return Err(WorldError::PrototypeChainTooDeep);
      }
      steps += 1;

      let record = self.record(obj)?;
      let record = record.read();
      if let Some(desc) = record.get(key) {
        return Ok(Some((obj, desc.clone())));
      }
      current = record.prototype;
    }
    Ok(None)
  }

  /// Gets the descriptor `key` resolves to from `obj` (its own or the nearest inherited one),
  /// without permission checks.
  pub fn get_property_descriptor(
    &self,
    obj: GcObject,
    key: &PropertyKey,
  ) -> Result<Option<PropertyDescriptor>, WorldError> {
    Ok(self.find_property(Some(obj), key)?.map(|(_, desc)| desc))
  }

  /// Returns whether `key` exists on `obj` or its prototype chain.
  pub fn has_property(&self, obj: GcObject, key: &PropertyKey) -> Result<bool, WorldError> {
    Ok(self.find_property(Some(obj), key)?.is_some())
  }

  /// Reads `key` from `obj` as `actor`.
  ///
  /// Only the nearest descriptor along the chain is consulted. Reading it requires the descriptor
  /// to be world-readable, owned by `actor`, or `actor` to be privileged. A name found nowhere in
  /// the chain reads as `undefined`.
  pub fn get_property(
    &self,
    obj: GcObject,
    key: &PropertyKey,
    actor: &Owner,
  ) -> Result<Value, WorldError> {
    match self.find_property(Some(obj), key)? {
      Some((_, desc)) if desc.can_read(actor) => Ok(desc.value),
      Some(_) => Err(deny(Access::Read, key, actor)),
      None => Ok(Value::Undefined),
    }
  }

  /// Writes `key` on `obj` as `actor`.
  ///
  /// - An own descriptor is updated in place (value only) if `actor` may write it.
  /// - An inherited name may be shadowed if `actor` may write the ancestor's descriptor; the new
  ///   local descriptor is seeded from the ancestor when it has `inherit` set.
  /// - A name found nowhere on the chain is created owned by `actor`, provided `actor` owns `obj`
  ///   or is privileged.
  ///
  /// Ancestors are never modified.
  pub fn set_property(
    &self,
    obj: GcObject,
    key: &PropertyKey,
    value: Value,
    actor: &Owner,
  ) -> Result<(), WorldError> {
    if let Value::Object(target) = &value {
      if !self.is_valid_object(*target) {
        return Err(WorldError::InvalidHandle);
      }
    }

    let record = self.record(obj)?;
    // The receiver stays write-locked while ancestors are inspected so the permission check and
    // the insertion are atomic. Ancestors are locked toward the root, never back.
    let mut record = record.write();

    if let Some(desc) = record.get_mut(key) {
      if !desc.can_write(actor) {
        return Err(deny(Access::Write, key, actor));
      }
      desc.value = value;
      return Ok(());
    }

    let desc = match self.find_property(record.prototype, key)? {
      Some((ancestor, inherited)) => {
        if !inherited.can_write(actor) {
          return Err(deny(Access::Write, key, actor));
        }
        trace!(?obj, ?ancestor, %key, principal = %actor, "shadowing inherited property");
        inherited.shadowed_by(actor, value)
      }
      None => {
        if !record.can_extend(actor) {
          return Err(deny(Access::Write, key, actor));
        }
        trace!(?obj, %key, principal = %actor, "creating property");
        PropertyDescriptor::new(actor.clone(), value)
      }
    };

    self.reserve_bytes(PropertyEntry::HEAP_SIZE_BYTES)?;
    record.properties.push(PropertyEntry {
      key: key.clone(),
      desc,
    });
    Ok(())
  }

  /// Deletes `obj`'s own `key` as `actor`.
  ///
  /// Returns `false` if there was no own property to delete. Inherited descriptors are never
  /// touched, so after deleting an override the inherited value becomes visible again.
  pub fn delete_property(
    &self,
    obj: GcObject,
    key: &PropertyKey,
    actor: &Owner,
  ) -> Result<bool, WorldError> {
    let record = self.record(obj)?;
    let mut record = record.write();
    let Some(idx) = record.position(key) else {
      return Ok(false);
    };
    if !record.properties[idx].desc.can_write(actor) {
      return Err(deny(Access::Write, key, actor));
    }
    record.properties.remove(idx);
    self.release_bytes(PropertyEntry::HEAP_SIZE_BYTES);
    Ok(true)
  }

  /// Changes the permission fields of `obj`'s own `key` as `actor`.
  ///
  /// The value is left alone. Requires write permission on the descriptor as it is before the
  /// change, so an owner may hand a property to another principal but not take it back.
  pub fn set_property_attributes(
    &self,
    obj: GcObject,
    key: &PropertyKey,
    patch: PropertyAttributesPatch,
    actor: &Owner,
  ) -> Result<(), WorldError> {
    let record = self.record(obj)?;
    let mut record = record.write();
    let Some(desc) = record.get_mut(key) else {
      return Err(WorldError::MalformedRequest(format!(
        "no own property '{key}' to change attributes of"
      )));
    };
    if !desc.can_write(actor) {
      return Err(deny(Access::Write, key, actor));
    }
    patch.apply(desc);
    Ok(())
  }

  /// For-in style enumeration of `obj` and its prototype chain.
  ///
  /// Own names come first, then each ancestor's, each in insertion order. Only the nearest
  /// descriptor for a name counts: a non-enumerable override hides an enumerable inherited
  /// property.
  pub fn enumerable_keys(&self, obj: GcObject) -> Result<Vec<PropertyKey>, WorldError> {
    let mut seen: HashSet<PropertyKey> = HashSet::new();
    let mut out = Vec::new();
    let mut current = Some(obj);
    let mut steps = 0usize;
    while let Some(obj) = current {
      if steps >= MAX_PROTOTYPE_CHAIN {
        return Err(WorldError::PrototypeChainTooDeep);
      }
      steps += 1;

      let record = self.record(obj)?;
      let record = record.read();
      collect_enumerable(&record, &mut seen, &mut out);
      current = record.prototype;
    }
    Ok(out)
  }
}

fn collect_enumerable(record: &JsObject, seen: &mut HashSet<PropertyKey>, out: &mut Vec<PropertyKey>) {
  for prop in record.properties.iter() {
    if seen.insert(prop.key.clone()) && prop.desc.enumerable {
      out.push(prop.key.clone());
    }
  }
}
