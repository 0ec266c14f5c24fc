//! Ownership and access control for the secret slot.
//!
//! The store holds one secret at a time. Whoever opens the empty slot first
//! for writing becomes its owner; from then on every open, read and write is
//! checked against that ownership until the secret has been read back and the
//! last handle is closed, at which point the slot wipes itself and waits for
//! the next owner.
//!
//! ```text
//!                  open(write)
//!   +---------+ ---------------> +---------+ --------+
//!   | Unowned |                  |  Owned  |         | open / read / write
//!   +---------+ <--------------- +---------+ <-------+   by the owner only
//!        ^       last close after
//!        |       a read-open, or
//!        +------ restore of an
//!                unowned snapshot
//! ```
//!
//! The store itself is not synchronized. It expects the single-threaded
//! message loop of a device driver; a concurrent host should wrap it the way
//! [`SecretDevice`](crate::device::SecretDevice) does.

use crate::error::{Result, SecretDeviceError};
use crate::identity::Identity;
use crate::snapshot;
use log::{debug, trace};
use std::fmt;
use zeroize::Zeroize;

/// Fixed capacity of the secret slot, in bytes.
///
/// Writes accumulate until they would cross this bound; the overflowing write
/// is refused whole.
pub const SECRET_CAPACITY: usize = 512;

/// How a client asks to use the secret when opening it.
///
/// Only the single-direction modes can succeed. A handle either fills the
/// slot or drains it, never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Drain the secret. Opening in this mode arms the reset that fires when
    /// the last handle goes away.
    ReadOnly,
    /// Fill the slot. At most one write handle exists at any moment.
    WriteOnly,
    /// Both directions at once. Always refused.
    ReadWrite,
}

/// Who currently holds the secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    /// The slot is empty and unclaimed.
    Unowned,
    /// The slot belongs to this identity until it is drained or granted away.
    OwnedBy(Identity),
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unowned => f.write_str("unowned"),
            Self::OwnedBy(identity) => write!(f, "{}", identity),
        }
    }
}

/// An opaque ticket for one successful open.
///
/// Handles are issued from a monotonic counter and never reused within the
/// life of a store, including across a snapshot round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(pub(crate) u64);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One live open session: who opened, and in which direction.
#[derive(Debug, Clone, Copy)]
pub(crate) struct OpenHandle {
    pub(crate) id: HandleId,
    pub(crate) identity: Identity,
    pub(crate) mode: AccessMode,
}

/// A single-slot secret store with exclusive-write, shared-read ownership.
///
/// See the [module docs](self) for the lifecycle. All operations are checked;
/// none panic on bad input.
///
/// # Examples
///
/// ```
/// use secretdevice::{AccessMode, Identity, Owner, SecretStore};
///
/// let mut store = SecretStore::new();
/// let courier = Identity::new(1000);
///
/// let handle = store.open(courier, AccessMode::WriteOnly)?;
/// store.write(handle, b"attack at dawn")?;
/// store.close(handle)?;
///
/// // The secret persists across the close and stays bound to its owner.
/// assert_eq!(store.owner(), Owner::OwnedBy(courier));
///
/// let handle = store.open(courier, AccessMode::ReadOnly)?;
/// let mut buf = [0u8; 32];
/// let n = store.read(handle, &mut buf)?;
/// assert_eq!(&buf[..n], b"attack at dawn");
/// store.close(handle)?;
///
/// // Drained and fully closed: the slot has wiped itself.
/// assert_eq!(store.owner(), Owner::Unowned);
/// # Ok::<(), secretdevice::SecretDeviceError>(())
/// ```
pub struct SecretStore {
    pub(crate) buffer: [u8; SECRET_CAPACITY],
    pub(crate) owner: Owner,
    pub(crate) open_count: usize,
    pub(crate) was_opened_for_read: bool,
    pub(crate) bytes_written: usize,
    pub(crate) bytes_read: usize,
    pub(crate) handles: Vec<OpenHandle>,
    pub(crate) next_handle: u64,
    pub(crate) total_opens: u64,
}

impl SecretStore {
    /// Creates an empty, unowned store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: [0u8; SECRET_CAPACITY],
            owner: Owner::Unowned,
            open_count: 0,
            was_opened_for_read: false,
            bytes_written: 0,
            bytes_read: 0,
            handles: Vec::new(),
            next_handle: 0,
            total_opens: 0,
        }
    }

    /// Opens the secret for `requestor` and returns the handle for the new
    /// session.
    ///
    /// Opening an unclaimed slot for writing claims it. Fails with
    /// [`AccessDenied`](SecretDeviceError::AccessDenied) for a read-write
    /// request or when the slot belongs to someone else, and with
    /// [`ResourceBusy`](SecretDeviceError::ResourceBusy) when a second write
    /// handle is requested while one is still open.
    pub fn open(&mut self, requestor: Identity, mode: AccessMode) -> Result<HandleId> {
        // A single handle may not both fill and drain the slot.
        if mode == AccessMode::ReadWrite {
            return Err(SecretDeviceError::AccessDenied);
        }
        if let Owner::OwnedBy(owner) = self.owner {
            if owner != requestor {
                return Err(SecretDeviceError::AccessDenied);
            }
        }
        // One writer at a time, handles left over from a grant included.
        if mode == AccessMode::WriteOnly && self.write_handle_open() {
            return Err(SecretDeviceError::ResourceBusy);
        }

        if self.owner == Owner::Unowned {
            self.owner = Owner::OwnedBy(requestor);
            trace!("Slot claimed by {}", requestor);
        }
        if mode == AccessMode::ReadOnly {
            self.was_opened_for_read = true;
        }

        let id = HandleId(self.next_handle);
        self.next_handle += 1;
        self.handles.push(OpenHandle {
            id,
            identity: requestor,
            mode,
        });
        self.open_count += 1;
        self.total_opens += 1;

        debug!(
            "Opened handle {} ({:?}) for {}; opened {} time(s) overall",
            id, mode, requestor, self.total_opens
        );

        #[cfg(feature = "metrics")]
        metrics::counter!("secretdevice.store.open", 1);

        Ok(id)
    }

    /// Closes `handle`.
    ///
    /// When the last handle closes after the secret was opened for reading,
    /// the slot releases its owner and wipes the buffer.
    pub fn close(&mut self, handle: HandleId) -> Result<()> {
        let position = self
            .handles
            .iter()
            .position(|h| h.id == handle)
            .ok_or(SecretDeviceError::BadHandle(handle))?;
        self.handles.remove(position);
        self.open_count -= 1;
        trace!("Closed handle {}; {} still open", handle, self.open_count);

        if self.was_opened_for_read && self.open_count == 0 {
            self.reset();
        }

        Ok(())
    }

    /// Copies up to `buf.len()` unread secret bytes into `buf` and returns
    /// how many were copied.
    ///
    /// Successive reads continue where the previous one stopped; `Ok(0)`
    /// means the secret is exhausted. The handle must be read-only and its
    /// opener must still own the secret.
    pub fn read(&mut self, handle: HandleId, buf: &mut [u8]) -> Result<usize> {
        let h = self.find(handle)?;
        if h.mode != AccessMode::ReadOnly {
            return Err(SecretDeviceError::AccessDenied);
        }
        // Ownership may have been granted away since the open.
        if self.owner != Owner::OwnedBy(h.identity) {
            return Err(SecretDeviceError::PermissionDenied);
        }

        let available = self.bytes_written - self.bytes_read;
        let n = available.min(buf.len());
        buf[..n].copy_from_slice(&self.buffer[self.bytes_read..self.bytes_read + n]);
        self.bytes_read += n;
        trace!(
            "Read {} byte(s); {} of {} consumed",
            n, self.bytes_read, self.bytes_written
        );
        Ok(n)
    }

    /// Appends `bytes` to the secret and returns how many were stored.
    ///
    /// The write is all or nothing. If it would push the total past
    /// [`SECRET_CAPACITY`] it fails with
    /// [`OutOfSpace`](SecretDeviceError::OutOfSpace) and stores nothing.
    pub fn write(&mut self, handle: HandleId, bytes: &[u8]) -> Result<usize> {
        let h = self.find(handle)?;
        if h.mode != AccessMode::WriteOnly {
            return Err(SecretDeviceError::AccessDenied);
        }
        if self.owner != Owner::OwnedBy(h.identity) {
            return Err(SecretDeviceError::PermissionDenied);
        }
        if bytes.len() > SECRET_CAPACITY - self.bytes_written {
            return Err(SecretDeviceError::OutOfSpace);
        }

        self.buffer[self.bytes_written..self.bytes_written + bytes.len()].copy_from_slice(bytes);
        self.bytes_written += bytes.len();
        trace!(
            "Wrote {} byte(s); {} of {} filled",
            bytes.len(),
            self.bytes_written,
            SECRET_CAPACITY
        );
        Ok(bytes.len())
    }

    /// Transfers ownership of the secret from `requestor` to `new_owner`.
    ///
    /// Only the current owner may grant, and granting to oneself is a no-op
    /// that still succeeds. Handles already open keep existing but fail their
    /// next transfer with
    /// [`PermissionDenied`](SecretDeviceError::PermissionDenied) once their
    /// opener no longer owns the slot.
    pub fn grant(&mut self, requestor: Identity, new_owner: Identity) -> Result<()> {
        match self.owner {
            Owner::OwnedBy(owner) if owner == requestor => {
                self.owner = Owner::OwnedBy(new_owner);
                debug!("Ownership granted: {} -> {}", requestor, new_owner);

                #[cfg(feature = "metrics")]
                metrics::counter!("secretdevice.store.grant", 1);

                Ok(())
            }
            _ => Err(SecretDeviceError::PermissionDenied),
        }
    }

    /// Serializes the complete store into a self-contained blob.
    ///
    /// The blob is meant to cross a live update into a fresh instance of the
    /// service; feed it to [`restore_state`](Self::restore_state). It contains
    /// the secret in the clear and deserves the same care as the store itself.
    #[must_use]
    pub fn save_state(&self) -> Vec<u8> {
        let blob = snapshot::encode(self);
        debug!("Saved state: {} byte(s)", blob.len());

        #[cfg(feature = "metrics")]
        metrics::histogram!("secretdevice.snapshot.bytes", blob.len() as f64);

        blob
    }

    /// Replaces this store's entire state with the contents of `blob`.
    ///
    /// The blob is validated before anything is touched; on
    /// [`CorruptState`](SecretDeviceError::CorruptState) the current state
    /// survives unchanged. Meant to run once at startup, before the store is
    /// handed to clients.
    pub fn restore_state(&mut self, blob: &[u8]) -> Result<()> {
        *self = snapshot::decode(blob)?;
        debug!(
            "Restored state: owner {}, {} open handle(s), {} byte(s) written",
            self.owner, self.open_count, self.bytes_written
        );
        Ok(())
    }

    /// Who holds the secret right now.
    #[must_use]
    pub fn owner(&self) -> Owner {
        self.owner
    }

    /// Number of handles currently open.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.open_count
    }

    /// Whether any read-only open happened since the slot was last claimed.
    #[must_use]
    pub fn was_opened_for_read(&self) -> bool {
        self.was_opened_for_read
    }

    /// Total bytes stored so far.
    #[must_use]
    pub fn bytes_written(&self) -> usize {
        self.bytes_written
    }

    /// Total bytes handed back to readers so far.
    #[must_use]
    pub fn bytes_read(&self) -> usize {
        self.bytes_read
    }

    fn find(&self, handle: HandleId) -> Result<OpenHandle> {
        self.handles
            .iter()
            .find(|h| h.id == handle)
            .copied()
            .ok_or(SecretDeviceError::BadHandle(handle))
    }

    fn write_handle_open(&self) -> bool {
        self.handles.iter().any(|h| h.mode == AccessMode::WriteOnly)
    }

    /// Releases the slot after its secret has been consumed.
    fn reset(&mut self) {
        self.owner = Owner::Unowned;
        self.was_opened_for_read = false;
        self.bytes_written = 0;
        self.bytes_read = 0;
        self.buffer.zeroize();
        debug!("Secret consumed; slot wiped and released");

        #[cfg(feature = "metrics")]
        metrics::counter!("secretdevice.store.reset", 1);
    }
}

impl Default for SecretStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SecretStore {
    fn drop(&mut self) {
        self.buffer.zeroize();
    }
}
