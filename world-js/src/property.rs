use crate::{JsString, Owner, Value, WorldError};
use core::fmt;

/// A property name.
///
/// Property names are strings. Use [`PropertyKey::try_from_value`] when the name comes from a
/// runtime value (e.g. a computed member expression).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyKey(JsString);

impl PropertyKey {
  pub fn new(name: &str) -> Self {
    Self(JsString::new(name))
  }

  /// Validates a runtime value used as a property name.
  ///
  /// Only string values name properties; anything else is a
  /// [`WorldError::MalformedRequest`].
  pub fn try_from_value(value: &Value) -> Result<Self, WorldError> {
    match value {
      Value::String(s) => Ok(Self(s.clone())),
      other => Err(WorldError::MalformedRequest(format!(
        "property name must be a string, got {}",
        other.type_tag()
      ))),
    }
  }

  pub fn as_str(&self) -> &str {
    self.0.as_str()
  }

  pub fn as_js_string(&self) -> &JsString {
    &self.0
  }
}

impl From<&str> for PropertyKey {
  fn from(value: &str) -> Self {
    Self::new(value)
  }
}

impl From<JsString> for PropertyKey {
  fn from(value: JsString) -> Self {
    Self(value)
  }
}

impl fmt::Debug for PropertyKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::Debug::fmt(&self.0, f)
  }
}

impl fmt::Display for PropertyKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::Display::fmt(&self.0, f)
  }
}

/// The permission-and-value record stored per property name.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
  /// The principal entitled to write this property.
  pub owner: Owner,
  pub value: Value,
  /// World-readable: any principal may read regardless of `owner`.
  pub readable: bool,
  /// Whether the property shows up in for-in style enumeration.
  pub enumerable: bool,
  /// Whether a descendant shadowing this name copies `owner`/`readable`/`enumerable`/`inherit`
  /// from this descriptor instead of using defaults.
  pub inherit: bool,
}

impl PropertyDescriptor {
  /// The descriptor for a name created from scratch: owned by the acting principal, readable,
  /// enumerable, not inherited.
  pub fn new(owner: Owner, value: Value) -> Self {
    Self {
      owner,
      value,
      readable: true,
      enumerable: true,
      inherit: false,
    }
  }

  /// The local descriptor created on a descendant when `actor` shadows this (inherited)
  /// descriptor.
  pub fn shadowed_by(&self, actor: &Owner, value: Value) -> Self {
    if self.inherit {
      Self {
        owner: self.owner.clone(),
        value,
        readable: self.readable,
        enumerable: self.enumerable,
        inherit: self.inherit,
      }
    } else {
      Self::new(actor.clone(), value)
    }
  }

  pub fn can_read(&self, actor: &Owner) -> bool {
    self.readable || self.can_write(actor)
  }

  pub fn can_write(&self, actor: &Owner) -> bool {
    actor.is_privileged() || *actor == self.owner
  }
}

/// A partial update of a descriptor's permission fields, used by
/// [`Heap::set_property_attributes`](crate::Heap::set_property_attributes).
///
/// `None` fields are left untouched.
#[derive(Debug, Default, Clone)]
pub struct PropertyAttributesPatch {
  pub owner: Option<Owner>,
  pub readable: Option<bool>,
  pub enumerable: Option<bool>,
  pub inherit: Option<bool>,
}

impl PropertyAttributesPatch {
  pub fn is_empty(&self) -> bool {
    self.owner.is_none()
      && self.readable.is_none()
      && self.enumerable.is_none()
      && self.inherit.is_none()
  }

  pub(crate) fn apply(self, desc: &mut PropertyDescriptor) {
    if let Some(owner) = self.owner {
      desc.owner = owner;
    }
    if let Some(readable) = self.readable {
      desc.readable = readable;
    }
    if let Some(enumerable) = self.enumerable {
      desc.enumerable = enumerable;
    }
    if let Some(inherit) = self.inherit {
      desc.inherit = inherit;
    }
  }
}
