use crate::store::HandleId;
use thiserror::Error;

/// The error type for secret device operations.
///
/// Every variant maps onto a POSIX errno via [`SecretDeviceError::errno`], so a
/// host dispatcher can hand the failure straight back to a client that speaks
/// errno rather than Rust.
///
/// # Examples
///
/// ```
/// use secretdevice::{AccessMode, Identity, SecretDeviceError, SecretStore};
///
/// let mut store = SecretStore::new();
/// let owner = Identity::new(1000);
/// let intruder = Identity::new(2000);
///
/// let handle = store.open(owner, AccessMode::WriteOnly).unwrap();
///
/// match store.open(intruder, AccessMode::ReadOnly) {
///     Err(SecretDeviceError::AccessDenied) => (),
///     _ => panic!("expected access to be denied"),
/// }
/// # store.close(handle).unwrap();
/// ```
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SecretDeviceError {
    /// The caller may not open the secret the way it asked to.
    ///
    /// Raised when the slot is owned by someone else, when a read-write open is
    /// attempted, or when a handle is used against its open mode.
    #[error("Access denied")]
    AccessDenied,

    /// The caller holds a handle but no longer owns the secret.
    ///
    /// Ownership can move between a handle being opened and used, so every
    /// transfer re-checks it. Also raised for a grant issued by a non-owner.
    #[error("Permission denied: caller does not own the secret")]
    PermissionDenied,

    /// A write handle is already outstanding somewhere.
    #[error("Device busy: a write handle is already open")]
    ResourceBusy,

    /// The write does not fit in the remaining capacity. Nothing was stored.
    #[error("Write would overflow the secret's capacity")]
    OutOfSpace,

    /// The control request code is not one this device understands.
    #[error("Unsupported control request {0:#06x}")]
    NotSupported(u32),

    /// The handle was never issued, or was already closed.
    #[error("Unknown or closed handle {0}")]
    BadHandle(HandleId),

    /// A request argument was malformed, for example a grant payload of the
    /// wrong length.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A saved state blob failed validation and was not restored.
    #[error("Corrupt state blob: {0}")]
    CorruptState(String),
}

impl SecretDeviceError {
    /// The POSIX errno equivalent of this error.
    #[must_use]
    pub fn errno(&self) -> i32 {
        match self {
            Self::AccessDenied => libc::EACCES,
            Self::PermissionDenied => libc::EPERM,
            Self::ResourceBusy => libc::EBUSY,
            Self::OutOfSpace => libc::ENOSPC,
            Self::NotSupported(_) => libc::ENOTTY,
            Self::BadHandle(_) => libc::EBADF,
            Self::InvalidArgument(_) => libc::EINVAL,
            Self::CorruptState(_) => libc::EIO,
        }
    }
}

/// A `Result` alias where the `Err` case is `secretdevice::SecretDeviceError`.
pub type Result<T> = std::result::Result<T, SecretDeviceError>;
