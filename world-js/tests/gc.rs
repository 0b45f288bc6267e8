use world_js::{Heap, HeapLimits, Principals, PropertyKey, Value, WorldError};

#[test]
fn gc_collects_unreachable_objects() -> Result<(), WorldError> {
  let mut heap = Heap::new(HeapLimits::new(1024 * 1024));
  let principals = Principals::new();
  let alice = principals.create("alice")?;

  let kept = heap.alloc_object(Some(alice.clone()), None)?;
  let child = heap.alloc_object(Some(alice.clone()), Some(kept))?;
  let referenced = heap.alloc_object(Some(alice.clone()), None)?;
  let dropped = heap.alloc_object(Some(alice.clone()), None)?;
  heap.set_property(
    child,
    &PropertyKey::new("ref"),
    Value::Object(referenced),
    &alice,
  )?;

  let root = heap.add_root(Value::Object(child));
  let before = heap.used_bytes();
  heap.collect_garbage();

  assert_eq!(heap.gc_runs(), 1);
  assert_eq!(heap.object_count(), 3);
  assert!(heap.is_valid_object(kept));
  assert!(heap.is_valid_object(child));
  assert!(heap.is_valid_object(referenced));
  assert!(!heap.is_valid_object(dropped));
  assert!(heap.used_bytes() < before);
  assert_eq!(heap.object_owner(dropped), Err(WorldError::InvalidHandle));

  heap.remove_root(root);
  heap.collect_garbage();
  assert_eq!(heap.object_count(), 0);
  assert_eq!(heap.used_bytes(), 0);
  Ok(())
}

#[test]
fn cycles_through_property_values_are_collected() -> Result<(), WorldError> {
  let mut heap = Heap::new(HeapLimits::new(1024 * 1024));
  let principals = Principals::new();
  let alice = principals.create("alice")?;

  let a = heap.alloc_object(Some(alice.clone()), None)?;
  let b = heap.alloc_object(Some(alice.clone()), None)?;
  let next = PropertyKey::new("next");
  heap.set_property(a, &next, Value::Object(b), &alice)?;
  heap.set_property(b, &next, Value::Object(a), &alice)?;

  let root = heap.add_root(Value::Object(a));
  heap.collect_garbage();
  assert_eq!(heap.object_count(), 2);

  heap.remove_root(root);
  heap.collect_garbage();
  assert_eq!(heap.object_count(), 0);
  Ok(())
}

#[test]
fn reused_slots_do_not_revive_stale_handles() -> Result<(), WorldError> {
  let mut heap = Heap::new(HeapLimits::new(1024 * 1024));

  let stale = heap.alloc_object(None, None)?;
  heap.collect_garbage();
  let fresh = heap.alloc_object(None, None)?;

  assert_eq!(stale.index(), fresh.index());
  assert_ne!(stale.generation(), fresh.generation());
  assert!(heap.is_valid_object(fresh));
  assert_eq!(
    heap.get_property(stale, &PropertyKey::new("x"), &Principals::new().create("x")?),
    Err(WorldError::InvalidHandle)
  );
  Ok(())
}

#[test]
fn roots_can_be_updated() -> Result<(), WorldError> {
  let mut heap = Heap::new(HeapLimits::new(1024 * 1024));

  let first = heap.alloc_object(None, None)?;
  let second = heap.alloc_object(None, None)?;
  let root = heap.add_root(Value::Object(first));
  heap.set_root(root, Value::Object(second));
  assert_eq!(heap.get_root(root), Some(Value::Object(second)));

  heap.collect_garbage();
  assert!(!heap.is_valid_object(first));
  assert!(heap.is_valid_object(second));

  heap.remove_root(root);
  assert_eq!(heap.get_root(root), None);
  Ok(())
}
