use crate::WorldError;
use core::fmt;
use parking_lot::Mutex;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A principal: the identity on whose behalf code reads and writes properties.
///
/// Owners compare by identity. Two `Owner`s created separately are different principals even if
/// their names and ids happen to match; clones of one `Owner` are the same principal.
#[derive(Clone)]
pub struct Owner(Arc<OwnerRecord>);

struct OwnerRecord {
  id: u64,
  name: Box<str>,
  privileged: bool,
}

impl Owner {
  fn new(id: u64, name: &str, privileged: bool) -> Self {
    Self(Arc::new(OwnerRecord {
      id,
      name: name.into(),
      privileged,
    }))
  }

  /// Registry-assigned id. Unique within the [`Principals`] registry that created this owner.
  pub fn id(&self) -> u64 {
    self.0.id
  }

  pub fn name(&self) -> &str {
    &self.0.name
  }

  /// Privileged (system) principals pass every permission check.
  pub fn is_privileged(&self) -> bool {
    self.0.privileged
  }
}

impl PartialEq for Owner {
  fn eq(&self, other: &Self) -> bool {
    Arc::ptr_eq(&self.0, &other.0)
  }
}

impl Eq for Owner {}

impl Hash for Owner {
  fn hash<H: Hasher>(&self, state: &mut H) {
    (Arc::as_ptr(&self.0) as usize).hash(state);
  }
}

impl fmt::Debug for Owner {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Owner")
      .field("id", &self.id())
      .field("name", &self.name())
      .field("privileged", &self.is_privileged())
      .finish()
  }
}

impl fmt::Display for Owner {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}#{}", self.name(), self.id())
  }
}

/// Registry of principals.
///
/// Creates owners with registry-unique ids and resolves ids back to the same identity, which is
/// what snapshot restoration needs to keep ownership intact.
#[derive(Default)]
pub struct Principals {
  state: Mutex<PrincipalsState>,
}

#[derive(Default)]
struct PrincipalsState {
  next_id: u64,
  owners: Vec<Owner>,
}

impl Principals {
  pub fn new() -> Self {
    Self::default()
  }

  /// Creates an ordinary principal.
  pub fn create(&self, name: &str) -> Result<Owner, WorldError> {
    self.create_with(name, false)
  }

  /// Creates a privileged (system) principal.
  pub fn create_privileged(&self, name: &str) -> Result<Owner, WorldError> {
    self.create_with(name, true)
  }

  fn create_with(&self, name: &str, privileged: bool) -> Result<Owner, WorldError> {
    let mut state = self.state.lock();
    let id = state.next_id;
    state.next_id = id
      .checked_add(1)
      .ok_or(WorldError::PrincipalIdsExhausted)?;
    let owner = Owner::new(id, name, privileged);
    state.owners.push(owner.clone());
    Ok(owner)
  }

  pub fn get(&self, id: u64) -> Option<Owner> {
    let state = self.state.lock();
    state.owners.iter().find(|o| o.id() == id).cloned()
  }

  /// Looks up a principal by name. Names are not required to be unique; the earliest match wins.
  pub fn find(&self, name: &str) -> Option<Owner> {
    let state = self.state.lock();
    state.owners.iter().find(|o| o.name() == name).cloned()
  }

  /// Resolves `id`, failing with [`WorldError::UnknownPrincipal`] if it was never registered.
  pub fn resolve(&self, id: u64) -> Result<Owner, WorldError> {
    self.get(id).ok_or(WorldError::UnknownPrincipal(id))
  }

  /// Returns the principal with `id`, registering it with the given attributes if absent.
  ///
  /// Used when restoring persisted worlds. An existing registration with a different name or
  /// privilege level is reported as a snapshot error rather than silently merged.
  pub fn intern(&self, id: u64, name: &str, privileged: bool) -> Result<Owner, WorldError> {
    let mut state = self.state.lock();
    if let Some(existing) = state.owners.iter().find(|o| o.id() == id) {
      if existing.name() != name || existing.is_privileged() != privileged {
        return Err(WorldError::Snapshot(format!(
          "principal {id} is already registered as {existing}"
        )));
      }
      return Ok(existing.clone());
    }
    let next = id
      .checked_add(1)
      .ok_or_else(|| WorldError::Snapshot(format!("principal id {id} is out of range")))?;
    state.next_id = state.next_id.max(next);
    let owner = Owner::new(id, name, privileged);
    state.owners.push(owner.clone());
    Ok(owner)
  }

  /// All registered principals, in id order.
  pub fn all(&self) -> Vec<Owner> {
    let mut owners = self.state.lock().owners.clone();
    owners.sort_by_key(|o| o.id());
    owners
  }
}

impl fmt::Debug for Principals {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_list().entries(self.all()).finish()
  }
}

#[cfg(test)]
mod tests {
  use super::Principals;
  use crate::WorldError;

  #[test]
  fn owners_compare_by_identity() {
    let principals = Principals::new();
    let alice = principals.create("alice").unwrap();
    let other = Principals::new().create("alice").unwrap();
    assert_eq!(alice, alice.clone());
    assert_eq!(alice.id(), other.id());
    assert_ne!(alice, other);
  }

  #[test]
  fn intern_reuses_and_advances_ids() {
    let principals = Principals::new();
    let restored = principals.intern(7, "bob", false).unwrap();
    assert_eq!(principals.intern(7, "bob", false).unwrap(), restored);
    assert!(principals.intern(7, "mallory", false).is_err());
    assert_eq!(principals.create("carol").unwrap().id(), 8);
    assert_eq!(principals.find("bob"), Some(restored.clone()));
    assert_eq!(principals.resolve(7), Ok(restored));
    assert!(principals.resolve(99).is_err());
  }

  #[test]
  fn ids_never_wrap() {
    let principals = Principals::new();
    assert!(matches!(
      principals.intern(u64::MAX, "max", false),
      Err(WorldError::Snapshot(_))
    ));
    assert!(principals.get(u64::MAX).is_none());

    let last = principals.intern(u64::MAX - 1, "last", false).unwrap();
    assert_eq!(last.id(), u64::MAX - 1);
    assert_eq!(
      principals.create("overflow"),
      Err(WorldError::PrincipalIdsExhausted)
    );
    assert!(principals.find("overflow").is_none());
  }
}
