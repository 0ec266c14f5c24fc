//! Serialization of the store for live updates.
//!
//! A snapshot is a flat, versionless blob. All integers are little endian and
//! the buffer always occupies its full capacity, so the fixed part has one
//! well-known length and the handle table hangs off the end:
//!
//! ```text
//! offset        field
//! ------        -----
//! 0   .. 512    buffer (full capacity, written prefix included)
//! 512           owner tag: 0 = unowned, 1 = owned
//! 513 .. 517    owner uid, u32 (zero when unowned)
//! 517 .. 525    open handle count, u64
//! 525           opened-for-read flag: 0 or 1
//! 526 .. 534    bytes written, u64
//! 534 .. 542    bytes read, u64
//! 542 .. 550    next handle id, u64
//! 550 .. 558    lifetime open count, u64
//! 558 .. 562    handle table length, u32
//! 562 ..        handle records: id u64, uid u32, mode u8 (13 bytes each)
//! ```
//!
//! Decoding validates the whole blob before a store is built from it, so a
//! truncated or inconsistent snapshot is refused rather than half-applied.
//! The blob carries the secret in the clear; hosts must move it over a
//! channel they would trust with the secret itself.

use crate::error::{Result, SecretDeviceError};
use crate::identity::Identity;
use crate::store::{AccessMode, HandleId, OpenHandle, Owner, SecretStore, SECRET_CAPACITY};

const OWNER_UNOWNED: u8 = 0;
const OWNER_OWNED: u8 = 1;

const MODE_WRITE: u8 = 0;
const MODE_READ: u8 = 1;

/// Byte length of everything before the handle records.
const FIXED_LEN: usize = SECRET_CAPACITY + 50;
/// Byte length of one handle record.
const HANDLE_LEN: usize = 13;

pub(crate) fn encode(store: &SecretStore) -> Vec<u8> {
    let mut blob = Vec::with_capacity(FIXED_LEN + store.handles.len() * HANDLE_LEN);

    blob.extend_from_slice(&store.buffer);
    match store.owner {
        Owner::Unowned => {
            blob.push(OWNER_UNOWNED);
            blob.extend_from_slice(&0u32.to_le_bytes());
        }
        Owner::OwnedBy(identity) => {
            blob.push(OWNER_OWNED);
            blob.extend_from_slice(&identity.uid().to_le_bytes());
        }
    }
    blob.extend_from_slice(&(store.open_count as u64).to_le_bytes());
    blob.push(u8::from(store.was_opened_for_read));
    blob.extend_from_slice(&(store.bytes_written as u64).to_le_bytes());
    blob.extend_from_slice(&(store.bytes_read as u64).to_le_bytes());
    blob.extend_from_slice(&store.next_handle.to_le_bytes());
    blob.extend_from_slice(&store.total_opens.to_le_bytes());
    blob.extend_from_slice(&(store.handles.len() as u32).to_le_bytes());

    for handle in &store.handles {
        blob.extend_from_slice(&handle.id.0.to_le_bytes());
        blob.extend_from_slice(&handle.identity.uid().to_le_bytes());
        blob.push(match handle.mode {
            AccessMode::WriteOnly => MODE_WRITE,
            AccessMode::ReadOnly => MODE_READ,
            // open() never issues read-write handles
            AccessMode::ReadWrite => unreachable!("read-write handles cannot exist"),
        });
    }

    blob
}

pub(crate) fn decode(blob: &[u8]) -> Result<SecretStore> {
    if blob.len() < FIXED_LEN {
        return Err(corrupt(format!(
            "blob is {} byte(s), expected at least {}",
            blob.len(),
            FIXED_LEN
        )));
    }

    let mut buffer = [0u8; SECRET_CAPACITY];
    buffer.copy_from_slice(&blob[..SECRET_CAPACITY]);

    let mut at = SECRET_CAPACITY;
    let owner_tag = blob[at];
    at += 1;
    let owner_uid = read_u32(blob, &mut at);
    let open_count = read_u64(blob, &mut at);
    let read_flag = blob[at];
    at += 1;
    let bytes_written = read_u64(blob, &mut at);
    let bytes_read = read_u64(blob, &mut at);
    let next_handle = read_u64(blob, &mut at);
    let total_opens = read_u64(blob, &mut at);
    let handle_count = read_u32(blob, &mut at) as usize;

    let expected = FIXED_LEN + handle_count * HANDLE_LEN;
    if blob.len() != expected {
        return Err(corrupt(format!(
            "blob is {} byte(s), expected {} for {} handle(s)",
            blob.len(),
            expected,
            handle_count
        )));
    }

    let owner = match (owner_tag, owner_uid) {
        (OWNER_UNOWNED, 0) => Owner::Unowned,
        (OWNER_UNOWNED, uid) => {
            return Err(corrupt(format!("unowned blob names owner uid {}", uid)));
        }
        (OWNER_OWNED, uid) => Owner::OwnedBy(Identity::new(uid)),
        (tag, _) => return Err(corrupt(format!("unknown owner tag {}", tag))),
    };
    let was_opened_for_read = match read_flag {
        0 => false,
        1 => true,
        flag => return Err(corrupt(format!("unknown read flag {}", flag))),
    };

    if bytes_written > SECRET_CAPACITY as u64 {
        return Err(corrupt(format!(
            "{} byte(s) written exceeds capacity {}",
            bytes_written, SECRET_CAPACITY
        )));
    }
    if bytes_read > bytes_written {
        return Err(corrupt(format!(
            "{} byte(s) read outruns {} written",
            bytes_read, bytes_written
        )));
    }
    if open_count != handle_count as u64 {
        return Err(corrupt(format!(
            "open count {} does not match handle table length {}",
            open_count, handle_count
        )));
    }

    let mut handles: Vec<OpenHandle> = Vec::with_capacity(handle_count);
    for _ in 0..handle_count {
        let id = read_u64(blob, &mut at);
        let uid = read_u32(blob, &mut at);
        let mode_tag = blob[at];
        at += 1;

        let mode = match mode_tag {
            MODE_WRITE => AccessMode::WriteOnly,
            MODE_READ => AccessMode::ReadOnly,
            tag => return Err(corrupt(format!("unknown handle mode tag {}", tag))),
        };
        if id >= next_handle {
            return Err(corrupt(format!(
                "handle id {} outruns allocation cursor {}",
                id, next_handle
            )));
        }
        if handles.iter().any(|h| h.id.0 == id) {
            return Err(corrupt(format!("duplicate handle id {}", id)));
        }

        handles.push(OpenHandle {
            id: HandleId(id),
            identity: Identity::new(uid),
            mode,
        });
    }

    let writers = handles
        .iter()
        .filter(|h| h.mode == AccessMode::WriteOnly)
        .count();
    if writers > 1 {
        return Err(corrupt(format!("{} write handles, at most 1 allowed", writers)));
    }
    if owner == Owner::Unowned
        && (open_count != 0 || bytes_written != 0 || bytes_read != 0 || was_opened_for_read)
    {
        return Err(corrupt("unowned blob carries session state".to_string()));
    }

    Ok(SecretStore {
        buffer,
        owner,
        open_count: open_count as usize,
        was_opened_for_read,
        bytes_written: bytes_written as usize,
        bytes_read: bytes_read as usize,
        handles,
        next_handle,
        total_opens,
    })
}

fn corrupt(reason: String) -> SecretDeviceError {
    SecretDeviceError::CorruptState(reason)
}

fn read_u32(blob: &[u8], at: &mut usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&blob[*at..*at + 4]);
    *at += 4;
    u32::from_le_bytes(bytes)
}

fn read_u64(blob: &[u8], at: &mut usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&blob[*at..*at + 8]);
    *at += 8;
    u64::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_store_encodes_to_fixed_length() {
        let store = SecretStore::new();
        let blob = encode(&store);
        assert_eq!(blob.len(), FIXED_LEN);
        assert!(blob.iter().all(|&b| b == 0));
    }

    #[test]
    fn mandated_fields_sit_at_their_offsets() {
        let mut store = SecretStore::new();
        let alice = Identity::new(0xAABBCCDD);
        let handle = store.open(alice, AccessMode::WriteOnly).unwrap();
        store.write(handle, b"xyz").unwrap();

        let blob = encode(&store);
        assert_eq!(&blob[..3], b"xyz");
        assert_eq!(blob[SECRET_CAPACITY], OWNER_OWNED);
        assert_eq!(
            &blob[SECRET_CAPACITY + 1..SECRET_CAPACITY + 5],
            &0xAABBCCDDu32.to_le_bytes()
        );
        // one open handle
        assert_eq!(
            &blob[SECRET_CAPACITY + 5..SECRET_CAPACITY + 13],
            &1u64.to_le_bytes()
        );
        // not opened for read
        assert_eq!(blob[SECRET_CAPACITY + 13], 0);
        // three bytes written, none read
        assert_eq!(
            &blob[SECRET_CAPACITY + 14..SECRET_CAPACITY + 22],
            &3u64.to_le_bytes()
        );
        assert_eq!(
            &blob[SECRET_CAPACITY + 22..SECRET_CAPACITY + 30],
            &0u64.to_le_bytes()
        );
        assert_eq!(blob.len(), FIXED_LEN + HANDLE_LEN);
    }

    #[test]
    fn truncated_blob_is_refused() {
        let store = SecretStore::new();
        let mut blob = encode(&store);
        blob.truncate(blob.len() - 1);
        assert!(matches!(
            decode(&blob),
            Err(SecretDeviceError::CorruptState(_))
        ));
    }

    #[test]
    fn unknown_owner_tag_is_refused() {
        let store = SecretStore::new();
        let mut blob = encode(&store);
        blob[SECRET_CAPACITY] = 9;
        assert!(matches!(
            decode(&blob),
            Err(SecretDeviceError::CorruptState(_))
        ));
    }

    #[test]
    fn cursor_inversion_is_refused() {
        let mut store = SecretStore::new();
        let alice = Identity::new(7);
        let handle = store.open(alice, AccessMode::WriteOnly).unwrap();
        store.write(handle, b"ab").unwrap();

        let mut blob = encode(&store);
        // claim 5 bytes read against 2 written
        blob[SECRET_CAPACITY + 22..SECRET_CAPACITY + 30]
            .copy_from_slice(&5u64.to_le_bytes());
        assert!(matches!(
            decode(&blob),
            Err(SecretDeviceError::CorruptState(_))
        ));
    }
}
