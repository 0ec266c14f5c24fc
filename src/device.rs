//! The dispatcher-facing surface of the secret store.
//!
//! A host embeds the store behind [`Device`], the narrow interface a driver
//! message loop calls into: open, close, transfer, control, save. The host is
//! responsible for resolving each caller to an [`Identity`] before it calls
//! in; nothing here re-authenticates.

use crate::error::{Result, SecretDeviceError};
use crate::identity::Identity;
use crate::store::{AccessMode, HandleId, SecretStore};
use log::trace;
use parking_lot::Mutex;

/// Name under which the device expects to be registered with its host.
pub const DEVICE_NAME: &str = "secrets";

/// Control request to transfer ownership of the secret.
///
/// Encoded as group `'s'`, command 1. The argument is the new owner's uid as
/// four little-endian bytes.
pub const GRANT_SECRET: u32 = 0x7301;

/// A character-device-shaped service.
///
/// The methods mirror what a driver dispatch table would route: each one is a
/// single client request, already resolved to an [`Identity`] where the
/// caller matters. Implementations must be safe to share across the threads
/// of a concurrent host.
pub trait Device: Send + Sync {
    /// The name the device registers under.
    fn name(&self) -> &'static str;

    /// Routes one open request. See [`SecretStore::open`].
    fn open(&self, requestor: Identity, mode: AccessMode) -> Result<HandleId>;

    /// Routes one close request. See [`SecretStore::close`].
    fn close(&self, handle: HandleId) -> Result<()>;

    /// Routes one read transfer. See [`SecretStore::read`].
    fn read(&self, handle: HandleId, buf: &mut [u8]) -> Result<usize>;

    /// Routes one write transfer. See [`SecretStore::write`].
    fn write(&self, handle: HandleId, bytes: &[u8]) -> Result<usize>;

    /// Routes one control request with its raw argument bytes.
    fn control(&self, requestor: Identity, request: u32, arg: &[u8]) -> Result<()>;

    /// Serializes the device's state for a live update.
    fn save_state(&self) -> Vec<u8>;
}

/// The secret store packaged as a [`Device`].
///
/// Wraps the store in a mutex so a multi-threaded host can call in from
/// anywhere; every operation takes the lock for its whole duration, which
/// preserves the store's one-request-at-a-time semantics.
///
/// # Examples
///
/// ```
/// use secretdevice::{AccessMode, Device, Identity, SecretDevice, GRANT_SECRET};
///
/// let device = SecretDevice::new();
/// let alice = Identity::new(1000);
/// let bob = Identity::new(2000);
///
/// let handle = device.open(alice, AccessMode::WriteOnly)?;
/// device.write(handle, b"for bob only")?;
/// device.close(handle)?;
///
/// // Hand the secret over instead of racing for an unowned slot.
/// device.control(alice, GRANT_SECRET, &bob.uid().to_le_bytes())?;
///
/// let handle = device.open(bob, AccessMode::ReadOnly)?;
/// let mut buf = [0u8; 16];
/// let n = device.read(handle, &mut buf)?;
/// assert_eq!(&buf[..n], b"for bob only");
/// device.close(handle)?;
/// # Ok::<(), secretdevice::SecretDeviceError>(())
/// ```
pub struct SecretDevice {
    store: Mutex<SecretStore>,
}

impl SecretDevice {
    /// Creates a device around an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: Mutex::new(SecretStore::new()),
        }
    }

    /// Creates a device from a state blob saved by a previous instance.
    ///
    /// This is the restore half of a live update and belongs in startup,
    /// before the device is registered with the host.
    pub fn from_snapshot(blob: &[u8]) -> Result<Self> {
        let mut store = SecretStore::new();
        store.restore_state(blob)?;
        Ok(Self {
            store: Mutex::new(store),
        })
    }
}

impl Default for SecretDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for SecretDevice {
    fn name(&self) -> &'static str {
        DEVICE_NAME
    }

    fn open(&self, requestor: Identity, mode: AccessMode) -> Result<HandleId> {
        self.store.lock().open(requestor, mode)
    }

    fn close(&self, handle: HandleId) -> Result<()> {
        self.store.lock().close(handle)
    }

    fn read(&self, handle: HandleId, buf: &mut [u8]) -> Result<usize> {
        self.store.lock().read(handle, buf)
    }

    fn write(&self, handle: HandleId, bytes: &[u8]) -> Result<usize> {
        self.store.lock().write(handle, bytes)
    }

    fn control(&self, requestor: Identity, request: u32, arg: &[u8]) -> Result<()> {
        if request != GRANT_SECRET {
            trace!("Rejected control request {:#06x}", request);
            return Err(SecretDeviceError::NotSupported(request));
        }
        let uid: [u8; 4] = arg.try_into().map_err(|_| {
            SecretDeviceError::InvalidArgument(format!(
                "grant argument must be 4 bytes, got {}",
                arg.len()
            ))
        })?;
        self.store
            .lock()
            .grant(requestor, Identity::new(u32::from_le_bytes(uid)))
    }

    fn save_state(&self) -> Vec<u8> {
        self.store.lock().save_state()
    }
}
