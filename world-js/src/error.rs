use core::fmt;

/// Errors produced by object model operations.
///
/// Every fallible operation returns one of these as data; nothing in this crate unwinds. The
/// embedding evaluator decides whether an error becomes a script exception, a silent no-op or a
/// logged security event. Use [`WorldError::kind`] for that decision.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorldError {
  /// The acting principal lacks the right to perform `access` on the nearest descriptor for
  /// `key`.
  #[error("permission denied: {principal} cannot {access} property '{key}'")]
  PermissionDenied {
    access: Access,
    key: String,
    principal: String,
  },

  /// The request itself is malformed (e.g. a non-string property name).
  #[error("malformed request: {0}")]
  MalformedRequest(String),

  /// The receiver cannot carry the requested property operation (`undefined`/`null` receivers,
  /// writes to primitives).
  #[error("invalid receiver: {0}")]
  InvalidReceiver(&'static str),

  /// An object handle was used after the underlying allocation was freed (or the handle is
  /// otherwise malformed).
  #[error("invalid handle")]
  InvalidHandle,

  /// An attempted prototype mutation would introduce a cycle in the prototype chain.
  #[error("prototype cycle")]
  PrototypeCycle,

  /// A prototype chain traversal exceeded a hard upper bound.
  #[error("prototype chain too deep")]
  PrototypeChainTooDeep,

  /// The heap has exceeded its configured memory limit.
  #[error("out of memory")]
  OutOfMemory,

  /// The principal registry has no ids left to assign.
  #[error("principal ids exhausted")]
  PrincipalIdsExhausted,

  /// A principal id is not registered.
  #[error("unknown principal {0}")]
  UnknownPrincipal(u64),

  /// A snapshot could not be captured or restored.
  #[error("snapshot: {0}")]
  Snapshot(String),
}

/// The kind of access a permission check guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
  Read,
  Write,
}

impl fmt::Display for Access {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Access::Read => f.write_str("read"),
      Access::Write => f.write_str("write"),
    }
  }
}

/// Coarse classification of a [`WorldError`].
///
/// Absence of a property is not an error at all, so it has no kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
  PermissionDenied,
  MalformedRequest,
  InvalidReceiver,
  /// Heap-level failures: stale handles, cycles, limits, unknown principals, bad snapshots.
  Internal,
}

impl WorldError {
  pub(crate) fn permission_denied(
    access: Access,
    key: &crate::PropertyKey,
    principal: &crate::Owner,
  ) -> Self {
    Self::PermissionDenied {
      access,
      key: key.as_str().to_string(),
      principal: principal.to_string(),
    }
  }

  pub fn kind(&self) -> ErrorKind {
    match self {
      WorldError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
      WorldError::MalformedRequest(_) => ErrorKind::MalformedRequest,
      WorldError::InvalidReceiver(_) => ErrorKind::InvalidReceiver,
      WorldError::InvalidHandle
      | WorldError::PrototypeCycle
      | WorldError::PrototypeChainTooDeep
      | WorldError::OutOfMemory
      | WorldError::PrincipalIdsExhausted
      | WorldError::UnknownPrincipal(_)
      | WorldError::Snapshot(_) => ErrorKind::Internal,
    }
  }

  pub fn is_permission_denied(&self) -> bool {
    self.kind() == ErrorKind::PermissionDenied
  }
}
