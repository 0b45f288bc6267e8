use crate::{GcObject, JsString};

/// A runtime value.
///
/// Primitives are stored inline (strings share their buffer); objects are represented by
/// GC-managed handles into a [`Heap`](crate::Heap). Cloning a `Value::Object` copies the handle,
/// so the same object may be referenced from any number of property slots.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
  /// The `undefined` value.
  Undefined,
  /// The `null` value. Also the terminal link of every prototype chain.
  Null,
  /// A boolean.
  Bool(bool),
  /// A number (IEEE-754 double).
  Number(f64),
  /// An immutable string.
  String(JsString),
  /// A GC-managed object.
  Object(GcObject),
}

impl Value {
  /// The name `typeof` reports for this value.
  pub fn type_tag(&self) -> &'static str {
    match self {
      Value::Undefined => "undefined",
      Value::Null => "object",
      Value::Bool(_) => "boolean",
      Value::Number(_) => "number",
      Value::String(_) => "string",
      Value::Object(_) => "object",
    }
  }

  /// Every variant other than `Object` is a primitive: immutable, with no per-instance property
  /// table.
  pub fn is_primitive(&self) -> bool {
    !matches!(self, Value::Object(_))
  }

  pub fn as_object(&self) -> Option<GcObject> {
    match self {
      Value::Object(obj) => Some(*obj),
      _ => None,
    }
  }

  pub fn as_string(&self) -> Option<&JsString> {
    match self {
      Value::String(s) => Some(s),
      _ => None,
    }
  }

  /// `SameValue(x, y)`.
  ///
  /// This differs from `==` for Numbers:
  /// - `NaN` is the same as `NaN`
  /// - `+0` and `-0` are distinct
  pub fn same_value(&self, other: &Self) -> bool {
    match (self, other) {
      (Value::Undefined, Value::Undefined) => true,
      (Value::Null, Value::Null) => true,
      (Value::Bool(a), Value::Bool(b)) => a == b,
      (Value::Number(a), Value::Number(b)) => {
        if a.is_nan() && b.is_nan() {
          return true;
        }
        if *a == 0.0 && *b == 0.0 {
          // Distinguish +0 and -0.
          return a.to_bits() == b.to_bits();
        }
        a == b
      }
      (Value::String(a), Value::String(b)) => a == b,
      (Value::Object(a), Value::Object(b)) => a == b,
      _ => false,
    }
  }
}

impl From<bool> for Value {
  fn from(value: bool) -> Self {
    Self::Bool(value)
  }
}

impl From<f64> for Value {
  fn from(value: f64) -> Self {
    Self::Number(value)
  }
}

impl From<&str> for Value {
  fn from(value: &str) -> Self {
    Self::String(JsString::new(value))
  }
}

impl From<JsString> for Value {
  fn from(value: JsString) -> Self {
    Self::String(value)
  }
}

impl From<GcObject> for Value {
  fn from(value: GcObject) -> Self {
    Self::Object(value)
  }
}
