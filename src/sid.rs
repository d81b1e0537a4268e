//! Service identifiers.

use std::fmt;

use uuid::Uuid;

/// Service identifier, assigned once per registration and never reused.
///
/// The only handle callers get back from [`Controller::register`](crate::Controller::register);
/// keep it to look up the service's metadata later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Sid(Uuid);

impl Sid {
    /// Allocates a fresh random identifier.
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for Sid {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
