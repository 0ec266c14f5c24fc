//! A single-slot secret passing device.
//!
//! One process leaves a secret, another picks it up. The slot holds exactly
//! one secret at a time and enforces a small ownership protocol modeled on a
//! character device:
//!
//! * The first client to open the empty slot for writing becomes its owner.
//! * Only the owner may open, read or write the secret after that; everyone
//!   else is turned away at open time.
//! * One write handle may exist at a time, and a handle works in one
//!   direction only.
//! * Once the secret has been opened for reading, closing the last handle
//!   wipes the slot and releases ownership for the next writer.
//! * The owner can hand the secret to another identity with the
//!   [`GRANT_SECRET`] control request, so the recipient does not have to win
//!   a race for an unowned slot.
//!
//! The core state machine lives in [`SecretStore`] and expects one request at
//! a time, the way a driver's message loop delivers them. [`SecretDevice`]
//! wraps it for concurrent hosts behind the [`Device`] trait.
//!
//! # Live updates
//!
//! The whole device state can be serialized with
//! [`save_state`](Device::save_state) and carried into a replacement instance
//! via [`SecretDevice::from_snapshot`], surviving open handles included.
//! The blob holds the secret in the clear, so it must only travel over a
//! channel trusted with the secret itself.
//!
//! # Examples
//!
//! ```
//! use secretdevice::{AccessMode, Device, Identity, SecretDevice};
//!
//! let device = SecretDevice::new();
//! let owner = Identity::new(1000);
//!
//! let handle = device.open(owner, AccessMode::WriteOnly)?;
//! device.write(handle, b"the cake is real")?;
//!
//! // Live update: a replacement instance picks up exactly where we stop.
//! let blob = device.save_state();
//! let device = SecretDevice::from_snapshot(&blob)?;
//!
//! device.close(handle)?;
//! let handle = device.open(owner, AccessMode::ReadOnly)?;
//! let mut buf = [0u8; 32];
//! let n = device.read(handle, &mut buf)?;
//! assert_eq!(&buf[..n], b"the cake is real");
//! device.close(handle)?;
//! # Ok::<(), secretdevice::SecretDeviceError>(())
//! ```
//!
//! # Logging and metrics
//!
//! Operations log through the [`log`] facade; wire up `env_logger` or any
//! other implementation to see them. With the `metrics` feature enabled the
//! store additionally emits counters for opens, grants and resets through the
//! [`metrics`] facade.

pub mod device;
pub mod error;
pub mod identity;
mod snapshot;
pub mod store;

pub use device::{Device, SecretDevice, DEVICE_NAME, GRANT_SECRET};
pub use error::{Result, SecretDeviceError};
pub use identity::Identity;
pub use store::{AccessMode, HandleId, Owner, SecretStore, SECRET_CAPACITY};
