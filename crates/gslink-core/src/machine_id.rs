//! Machine identity generation
//!
//! Builds the fixed-layout machine-identity blob sent during authentication:
//! a root-object marker, the object name `MessageObject`, and three string
//! fields (`BB3`, `FF2`, `3B3`) each holding a 40-character hex SHA-1 digest
//! of a seed string, closed by two object terminators. The layout is fixed
//! at 155 bytes and must be reproduced exactly for backend interop.

use rand::RngCore;
use sha1::{Digest, Sha1};

use crate::storage::{read_one, BlobStorage};

/// Exact size of the identity blob with hex-digest encoding
pub const MACHINE_ID_LEN: usize = 155;

/// Blob name used when the persistent-random policy is selected
pub const MACHINE_ID_BLOB: &str = "machine-id.bin";

/// Field names, in wire order
const FIELD_NAMES: [&str; 3] = ["BB3", "FF2", "3B3"];

// ----------------------------------------------------------------------------
// Policy
// ----------------------------------------------------------------------------

/// How the machine identity sent at logon is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineIdPolicy {
    /// No machine identity is sent
    None,
    /// A fresh random identity on every logon
    AlwaysRandom,
    /// Identity derived from the account's long-lived auth token
    TokenDerived,
    /// A random identity generated once and persisted in blob storage
    PersistentRandom,
}

/// Default seed format strings for the token-derived policy; `{token}` is
/// substituted with the logon token
pub fn default_seed_formats() -> [String; 3] {
    [
        "GsLink Hash BB3 {token}".to_string(),
        "GsLink Hash FF2 {token}".to_string(),
        "GsLink Hash 3B3 {token}".to_string(),
    ]
}

// ----------------------------------------------------------------------------
// Blob Construction
// ----------------------------------------------------------------------------

fn sha1_hex(seed: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(seed.as_bytes());
    hex::encode(hasher.finalize())
}

fn write_cstring(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
}

/// Build the identity blob from three seed strings.
///
/// Deterministic for deterministic seeds; always [`MACHINE_ID_LEN`] bytes.
pub fn build_machine_id(seeds: &[String; 3]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(MACHINE_ID_LEN);

    // Root object marker and name
    buf.push(0x00);
    write_cstring(&mut buf, "MessageObject");

    for (name, seed) in FIELD_NAMES.iter().zip(seeds.iter()) {
        // String field marker, field name, 40-hex digest
        buf.push(0x01);
        write_cstring(&mut buf, name);
        write_cstring(&mut buf, &sha1_hex(seed));
    }

    // Two object terminators
    buf.push(0x08);
    buf.push(0x08);

    debug_assert_eq!(buf.len(), MACHINE_ID_LEN);
    buf
}

fn random_seeds() -> [String; 3] {
    let mut rng = rand::thread_rng();
    let mut seed = || {
        let mut bytes = [0u8; 16];
        rng.fill_bytes(&mut bytes);
        hex::encode(bytes)
    };
    [seed(), seed(), seed()]
}

/// Produce the machine identity for a logon attempt under the given policy.
///
/// `PersistentRandom` reads the cached blob from storage and writes a fresh
/// one when absent; `TokenDerived` substitutes the auth token into the seed
/// formats and falls back to random seeds for anonymous logons.
pub fn machine_id_for(
    policy: MachineIdPolicy,
    token: Option<&str>,
    formats: &[String; 3],
    storage: &mut dyn BlobStorage,
) -> Option<Vec<u8>> {
    match policy {
        MachineIdPolicy::None => None,
        MachineIdPolicy::AlwaysRandom => Some(build_machine_id(&random_seeds())),
        MachineIdPolicy::TokenDerived => match token {
            Some(token) => {
                let seeds = [
                    formats[0].replace("{token}", token),
                    formats[1].replace("{token}", token),
                    formats[2].replace("{token}", token),
                ];
                Some(build_machine_id(&seeds))
            }
            None => Some(build_machine_id(&random_seeds())),
        },
        MachineIdPolicy::PersistentRandom => {
            if let Some(blob) = read_one(storage, MACHINE_ID_BLOB) {
                if blob.len() == MACHINE_ID_LEN {
                    return Some(blob);
                }
            }
            let blob = build_machine_id(&random_seeds());
            // Best effort; an unwritable store only costs identity stability
            if let Err(e) = storage.write_named(MACHINE_ID_BLOB, &blob) {
                tracing::warn!("failed to persist machine id: {e}");
            }
            Some(blob)
        }
    }
}

// ----------------------------------------------------------------------------
// Local Machine Key
// ----------------------------------------------------------------------------

/// Stable local key used to scope persisted per-machine blobs (such as the
/// cell-id hint) when several servers share one blob store
pub fn internal_machine_key() -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
    sha1_hex(&host)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn fixed_seeds() -> [String; 3] {
        [
            "seed one".to_string(),
            "seed two".to_string(),
            "seed three".to_string(),
        ]
    }

    #[test]
    fn test_blob_is_155_bytes_and_deterministic() {
        let a = build_machine_id(&fixed_seeds());
        let b = build_machine_id(&fixed_seeds());
        assert_eq!(a.len(), MACHINE_ID_LEN);
        assert_eq!(a, b);
    }

    #[test]
    fn test_blob_layout() {
        let blob = build_machine_id(&fixed_seeds());

        assert_eq!(blob[0], 0x00);
        assert_eq!(&blob[1..14], b"MessageObject");
        assert_eq!(blob[14], 0);

        // First field: marker, "BB3\0", then 40 hex chars and a terminator
        assert_eq!(blob[15], 0x01);
        assert_eq!(&blob[16..19], b"BB3");
        assert_eq!(blob[19], 0);
        let digest = &blob[20..60];
        assert!(digest.iter().all(|b| b.is_ascii_hexdigit()));
        assert_eq!(blob[60], 0);

        assert_eq!(&blob[MACHINE_ID_LEN - 2..], &[0x08, 0x08]);
    }

    #[test]
    fn test_different_seeds_differ() {
        let a = build_machine_id(&fixed_seeds());
        let other = [
            "seed one".to_string(),
            "seed two".to_string(),
            "different".to_string(),
        ];
        let b = build_machine_id(&other);
        assert_ne!(a, b);
        assert_eq!(b.len(), MACHINE_ID_LEN);
    }

    #[test]
    fn test_token_derived_is_stable_per_token() {
        let mut storage = MemoryStorage::new();
        let formats = default_seed_formats();
        let a = machine_id_for(
            MachineIdPolicy::TokenDerived,
            Some("tok123"),
            &formats,
            &mut storage,
        )
        .unwrap();
        let b = machine_id_for(
            MachineIdPolicy::TokenDerived,
            Some("tok123"),
            &formats,
            &mut storage,
        )
        .unwrap();
        let c = machine_id_for(
            MachineIdPolicy::TokenDerived,
            Some("tok456"),
            &formats,
            &mut storage,
        )
        .unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_persistent_random_reuses_stored_blob() {
        let mut storage = MemoryStorage::new();
        let formats = default_seed_formats();
        let a = machine_id_for(MachineIdPolicy::PersistentRandom, None, &formats, &mut storage)
            .unwrap();
        let b = machine_id_for(MachineIdPolicy::PersistentRandom, None, &formats, &mut storage)
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), MACHINE_ID_LEN);
    }

    #[test]
    fn test_none_policy_yields_nothing() {
        let mut storage = MemoryStorage::new();
        let formats = default_seed_formats();
        assert!(machine_id_for(MachineIdPolicy::None, Some("tok"), &formats, &mut storage)
            .is_none());
    }
}
