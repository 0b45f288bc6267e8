use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// An immutable string primitive.
///
/// Clones share the backing buffer, so the same string can be stored in many property slots across
/// many objects without copying. Equality, ordering and hashing are by contents.
#[derive(Clone)]
pub struct JsString {
  text: Arc<str>,
  hash64: u64,
}

impl JsString {
  pub fn new(text: &str) -> Self {
    Self::from_arc(Arc::from(text))
  }

  fn from_arc(text: Arc<str>) -> Self {
    let hash64 = stable_hash64(text.as_bytes());
    Self { text, hash64 }
  }

  pub fn as_str(&self) -> &str {
    &self.text
  }

  pub fn len(&self) -> usize {
    self.text.len()
  }

  pub fn is_empty(&self) -> bool {
    self.text.is_empty()
  }

  /// A hash of the contents that is stable across processes and platforms.
  pub fn stable_hash64(&self) -> u64 {
    self.hash64
  }
}

impl From<&str> for JsString {
  fn from(value: &str) -> Self {
    Self::new(value)
  }
}

impl From<String> for JsString {
  fn from(value: String) -> Self {
    Self::from_arc(Arc::from(value))
  }
}

impl Borrow<str> for JsString {
  fn borrow(&self) -> &str {
    self.as_str()
  }
}

impl PartialEq for JsString {
  fn eq(&self, other: &Self) -> bool {
    self.hash64 == other.hash64 && self.text == other.text
  }
}

impl Eq for JsString {}

impl PartialEq<str> for JsString {
  fn eq(&self, other: &str) -> bool {
    &*self.text == other
  }
}

impl PartialEq<&str> for JsString {
  fn eq(&self, other: &&str) -> bool {
    &*self.text == *other
  }
}

impl PartialOrd for JsString {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for JsString {
  fn cmp(&self, other: &Self) -> Ordering {
    self.text.cmp(&other.text)
  }
}

impl Hash for JsString {
  fn hash<H: Hasher>(&self, state: &mut H) {
    // Must agree with `str`'s `Hash` so `Borrow<str>` lookups work.
    self.as_str().hash(state);
  }
}

impl fmt::Debug for JsString {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::Debug::fmt(self.as_str(), f)
  }
}

impl fmt::Display for JsString {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

const FNV_OFFSET_BASIS_64: u64 = 0xcbf29ce484222325;
const FNV_PRIME_64: u64 = 0x00000100000001B3;

fn stable_hash64(bytes: &[u8]) -> u64 {
  let mut hash = FNV_OFFSET_BASIS_64;
  for byte in bytes {
    hash ^= *byte as u64;
    hash = hash.wrapping_mul(FNV_PRIME_64);
  }
  hash
}
