use std::thread;
use world_js::{Heap, HeapLimits, Principals, PropertyKey, Realm, Value, WorldError};

const THREADS: usize = 8;
const ROUNDS: usize = 200;

#[test]
fn concurrent_readers_and_writers_share_a_heap() -> Result<(), WorldError> {
  let heap = Heap::new(HeapLimits::new(32 * 1024 * 1024));
  let principals = Principals::new();
  let system = principals.create_privileged("system")?;
  let realm = Realm::new(&heap)?;

  let base = realm.alloc_object(&heap, &system)?;
  let counter = PropertyKey::new("counter");
  heap.set_property(base, &counter, Value::Number(0.0), &system)?;
  let actors: Vec<_> = (0..THREADS)
    .map(|i| principals.create(&format!("user{i}")))
    .collect::<Result<_, _>>()?;
  let children: Vec<_> = actors
    .iter()
    .map(|actor| heap.alloc_object(Some(actor.clone()), Some(base)))
    .collect::<Result<_, _>>()?;
  let mine = PropertyKey::new("mine");

  thread::scope(|s| {
    let mut workers = Vec::new();
    for (i, actor) in actors.iter().enumerate() {
      let heap = &heap;
      let children = &children;
      let counter = &counter;
      let mine = &mine;
      workers.push(s.spawn(move || -> Result<(), WorldError> {
        for round in 0..ROUNDS {
          // Each thread writes its own child and reads everyone else's.
          heap.set_property(children[i], mine, Value::Number(round as f64), actor)?;
          for child in children.iter() {
            let _ = heap.get_property(*child, mine, actor)?;
            let _ = heap.get_property(*child, counter, actor)?;
          }
          // Owning the child is not enough to shadow the system's counter.
          let denied = heap
            .set_property(children[i], counter, Value::Null, actor)
            .unwrap_err();
          assert!(denied.is_permission_denied());
          // Nor may anyone add names to a sibling's child.
          let sibling = children[(i + 1) % THREADS];
          let denied = heap
            .set_property(sibling, &PropertyKey::new("graffiti"), Value::Null, actor)
            .unwrap_err();
          assert!(denied.is_permission_denied());
        }
        Ok(())
      }));
    }

    // The system principal bumps the shared counter meanwhile.
    workers.push(s.spawn(|| -> Result<(), WorldError> {
      for round in 1..=ROUNDS {
        heap.set_property(base, &counter, Value::Number(round as f64), &system)?;
      }
      Ok(())
    }));

    workers
      .into_iter()
      .try_for_each(|worker| worker.join().expect("worker panicked"))
  })?;

  for child in children.iter() {
    assert_eq!(heap.own_property_keys(*child)?, vec![mine.clone()]);
    for actor in actors.iter() {
      assert_eq!(
        heap.get_property(*child, &mine, actor)?,
        Value::Number((ROUNDS - 1) as f64)
      );
    }
    assert_eq!(
      heap.get_property(*child, &counter, &system)?,
      Value::Number(ROUNDS as f64)
    );
  }
  Ok(())
}

#[test]
fn concurrent_prototype_changes_never_form_a_cycle() -> Result<(), WorldError> {
  let heap = Heap::new(HeapLimits::new(1024 * 1024));
  let a = heap.alloc_object(None, None)?;
  let b = heap.alloc_object(None, None)?;

  let (ab, ba) = thread::scope(|s| {
    let ab = s.spawn(|| heap.object_set_prototype(a, Some(b)));
    let ba = s.spawn(|| heap.object_set_prototype(b, Some(a)));
    (ab.join(), ba.join())
  });
  let results = [
    ab.expect("thread panicked"),
    ba.expect("thread panicked"),
  ];
  assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
  assert!(results.contains(&Err(WorldError::PrototypeCycle)));
  Ok(())
}
