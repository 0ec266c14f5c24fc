use std::fmt;

/// The resolved credential of a client, reduced to its user id.
///
/// The device trusts the host dispatcher to have authenticated the caller; an
/// `Identity` is the result of that resolution, not a claim made by the client
/// itself. Two identities compare equal exactly when their uids do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Identity(u32);

impl Identity {
    /// Wraps an already-resolved uid.
    #[must_use]
    pub const fn new(uid: u32) -> Self {
        Self(uid)
    }

    /// The underlying uid.
    #[must_use]
    pub const fn uid(self) -> u32 {
        self.0
    }
}

impl From<u32> for Identity {
    fn from(uid: u32) -> Self {
        Self(uid)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "uid:{}", self.0)
    }
}
