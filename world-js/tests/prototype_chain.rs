use world_js::{
  Heap, HeapLimits, Principals, PropertyAttributesPatch, PropertyKey, Value, WorldError,
  MAX_PROTOTYPE_CHAIN,
};

fn heap() -> Heap {
  Heap::new(HeapLimits::new(32 * 1024 * 1024))
}

#[test]
fn lookup_finds_nearest_ancestor() -> Result<(), WorldError> {
  let heap = heap();
  let principals = Principals::new();
  let alice = principals.create("alice")?;
  let bob = principals.create("bob")?;

  // a -> b -> c -> null
  let c = heap.alloc_object(Some(alice.clone()), None)?;
  let b = heap.alloc_object(Some(alice.clone()), Some(c))?;
  let a = heap.alloc_object(Some(alice.clone()), Some(b))?;

  let z = PropertyKey::new("z");
  heap.set_property(b, &z, Value::from("on b"), &alice)?;

  assert_eq!(heap.get_property(a, &z, &bob)?, Value::from("on b"));
  assert_eq!(heap.get_property(c, &z, &bob)?, Value::Undefined);
  assert!(heap.has_property(a, &z)?);
  assert_eq!(heap.get_own_property(a, &z)?, None);
  let inherited = heap.get_property_descriptor(a, &z)?.expect("inherited descriptor");
  assert_eq!(inherited.owner, alice);
  Ok(())
}

#[test]
fn shadowing_creates_a_local_descriptor() -> Result<(), WorldError> {
  let heap = heap();
  let principals = Principals::new();
  let alice = principals.create("alice")?;

  let parent = heap.alloc_object(Some(alice.clone()), None)?;
  let child = heap.alloc_object(Some(alice.clone()), Some(parent))?;
  let n = PropertyKey::new("n");
  heap.set_property(parent, &n, Value::Number(1.0), &alice)?;

  assert_eq!(heap.get_property(child, &n, &alice)?, Value::Number(1.0));
  heap.set_property(child, &n, Value::Number(2.0), &alice)?;

  assert_eq!(heap.get_property(child, &n, &alice)?, Value::Number(2.0));
  assert_eq!(heap.get_property(parent, &n, &alice)?, Value::Number(1.0));
  assert!(heap.get_own_property(child, &n)?.is_some());

  // Deleting the override reveals the inherited value again.
  assert!(heap.delete_property(child, &n, &alice)?);
  assert_eq!(heap.get_property(child, &n, &alice)?, Value::Number(1.0));
  assert_eq!(
    heap.get_own_property(parent, &n)?.map(|d| d.value),
    Some(Value::Number(1.0))
  );
  Ok(())
}

#[test]
fn shadowing_needs_write_access_to_the_inherited_descriptor() -> Result<(), WorldError> {
  let heap = heap();
  let principals = Principals::new();
  let alice = principals.create("alice")?;
  let bob = principals.create("bob")?;

  let parent = heap.alloc_object(Some(alice.clone()), None)?;
  let child = heap.alloc_object(Some(bob.clone()), Some(parent))?;
  let n = PropertyKey::new("n");
  heap.set_property(parent, &n, Value::Number(1.0), &alice)?;

  let err = heap
    .set_property(child, &n, Value::Number(2.0), &bob)
    .unwrap_err();
  assert!(err.is_permission_denied());
  assert_eq!(heap.get_own_property(child, &n)?, None);

  // Unrelated names are still free to create.
  heap.set_property(child, &PropertyKey::new("m"), Value::Null, &bob)?;
  Ok(())
}

#[test]
fn inheriting_descriptors_seed_the_shadow() -> Result<(), WorldError> {
  let heap = heap();
  let principals = Principals::new();
  let alice = principals.create("alice")?;
  let system = principals.create_privileged("system")?;

  let parent = heap.alloc_object(Some(alice.clone()), None)?;
  let child = heap.alloc_object(Some(alice.clone()), Some(parent))?;
  let n = PropertyKey::new("n");
  heap.set_property(parent, &n, Value::Number(1.0), &alice)?;
  heap.set_property_attributes(
    parent,
    &n,
    PropertyAttributesPatch {
      enumerable: Some(false),
      inherit: Some(true),
      ..Default::default()
    },
    &alice,
  )?;

  heap.set_property(child, &n, Value::Number(2.0), &system)?;
  let desc = heap.get_own_property(child, &n)?.expect("shadow");
  assert_eq!(desc.owner, alice);
  assert!(!desc.enumerable);
  assert!(desc.inherit);
  assert_eq!(desc.value, Value::Number(2.0));
  Ok(())
}

#[test]
fn set_prototype_rejects_direct_self() -> Result<(), WorldError> {
  let heap = heap();
  let obj = heap.alloc_object(None, None)?;
  assert_eq!(
    heap.object_set_prototype(obj, Some(obj)),
    Err(WorldError::PrototypeCycle)
  );
  Ok(())
}

#[test]
fn set_prototype_rejects_indirect_cycle() -> Result<(), WorldError> {
  let heap = heap();
  let a = heap.alloc_object(None, None)?;
  let b = heap.alloc_object(None, None)?;
  let c = heap.alloc_object(None, None)?;

  heap.object_set_prototype(a, Some(b))?;
  heap.object_set_prototype(b, Some(c))?;
  assert_eq!(
    heap.object_set_prototype(c, Some(a)),
    Err(WorldError::PrototypeCycle)
  );
  assert_eq!(heap.object_prototype(c)?, None);

  heap.object_set_prototype(a, None)?;
  assert_eq!(heap.object_prototype(a)?, None);
  Ok(())
}

#[test]
fn prototype_chain_traversal_is_bounded() -> Result<(), WorldError> {
  let heap = heap();
  let principals = Principals::new();
  let alice = principals.create("alice")?;
  let key = PropertyKey::new("x");

  let base = heap.alloc_object(Some(alice.clone()), None)?;
  heap.set_property(base, &key, Value::Number(123.0), &alice)?;

  let mut prev = base;
  for _ in 0..(MAX_PROTOTYPE_CHAIN - 1) {
    prev = heap.alloc_object(Some(alice.clone()), Some(prev))?;
  }
  let leaf = prev;
  assert_eq!(heap.get_property(leaf, &key, &alice)?, Value::Number(123.0));

  // One more hop exceeds the cap.
  let too_deep = heap.alloc_object(Some(alice.clone()), Some(leaf))?;
  assert_eq!(
    heap.get_property(too_deep, &key, &alice),
    Err(WorldError::PrototypeChainTooDeep)
  );
  assert_eq!(
    heap.enumerable_keys(too_deep),
    Err(WorldError::PrototypeChainTooDeep)
  );
  Ok(())
}

#[test]
fn enumeration_honours_the_nearest_descriptor() -> Result<(), WorldError> {
  let heap = heap();
  let principals = Principals::new();
  let alice = principals.create("alice")?;

  let parent = heap.alloc_object(Some(alice.clone()), None)?;
  let child = heap.alloc_object(Some(alice.clone()), Some(parent))?;
  for name in ["a", "b", "hidden"] {
    heap.set_property(parent, &PropertyKey::new(name), Value::Null, &alice)?;
  }
  for name in ["c", "a", "hidden"] {
    heap.set_property(child, &PropertyKey::new(name), Value::Null, &alice)?;
  }
  heap.set_property_attributes(
    child,
    &PropertyKey::new("hidden"),
    PropertyAttributesPatch {
      enumerable: Some(false),
      ..Default::default()
    },
    &alice,
  )?;

  let keys: Vec<String> = heap
    .enumerable_keys(child)?
    .iter()
    .map(|k| k.as_str().to_string())
    .collect();
  assert_eq!(keys, ["c", "a", "b"]);

  let own: Vec<String> = heap
    .own_property_keys(child)?
    .iter()
    .map(|k| k.as_str().to_string())
    .collect();
  assert_eq!(own, ["c", "a", "hidden"]);
  Ok(())
}
