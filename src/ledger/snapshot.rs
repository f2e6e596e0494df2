use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{LedgerError, LedgerResult};

/// Version of the persisted ledger layout. Bumped whenever a stored field is
/// added, removed or reinterpreted.
pub const SCHEMA_VERSION: u16 = 1;

/// Versioned, self-verifying export of a ledger's full state.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerSnapshot<S> {
    pub schema_version: u16,
    pub kind: String,
    pub state: S,
    /// Hex SHA-256 over the kind and the serialized state.
    pub state_root: String,
}

impl<S> LedgerSnapshot<S>
where
    S: Serialize + DeserializeOwned,
{
    pub fn capture(kind: &str, state: S) -> LedgerResult<Self> {
        let root = state_root(kind, &state)?;
        Ok(Self {
            schema_version: SCHEMA_VERSION,
            kind: kind.to_string(),
            state,
            state_root: hex::encode(root),
        })
    }

    /// Checks version, kind and root, then hands back the state.
    pub fn into_state(self, kind: &str) -> LedgerResult<S> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(LedgerError::UnsupportedSchema {
                found: self.schema_version,
                expected: SCHEMA_VERSION,
            });
        }
        if self.kind != kind {
            return Err(LedgerError::SnapshotKind {
                expected: kind.to_string(),
                found: self.kind,
            });
        }
        let expected = hex::decode(&self.state_root).map_err(|_| LedgerError::StateRootMismatch)?;
        if expected.as_slice() != state_root(kind, &self.state)?.as_slice() {
            return Err(LedgerError::StateRootMismatch);
        }
        Ok(self.state)
    }

    pub fn to_json(&self) -> LedgerResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| LedgerError::Encoding(e.to_string()))
    }

    pub fn from_json(raw: &str) -> LedgerResult<Self> {
        serde_json::from_str(raw).map_err(|e| LedgerError::Encoding(e.to_string()))
    }
}

fn state_root<S: Serialize>(kind: &str, state: &S) -> LedgerResult<[u8; 32]> {
    let encoded = serde_json::to_vec(state).map_err(|e| LedgerError::Encoding(e.to_string()))?;
    let mut hasher = Sha256::new();
    hasher.update(b"state");
    hasher.update(kind.as_bytes());
    hasher.update((encoded.len() as u64).to_le_bytes());
    hasher.update(&encoded);
    Ok(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
    struct Toy {
        total: u128,
    }

    #[test]
    fn root_is_deterministic_and_tamper_evident() {
        let a = LedgerSnapshot::capture("toy", Toy { total: 5 }).unwrap();
        let b = LedgerSnapshot::capture("toy", Toy { total: 5 }).unwrap();
        assert_eq!(a.state_root, b.state_root);

        let mut tampered = a.clone();
        tampered.state.total = 6;
        assert_eq!(
            tampered.into_state("toy").unwrap_err(),
            LedgerError::StateRootMismatch
        );
        assert_eq!(a.into_state("toy").unwrap(), Toy { total: 5 });
    }

    #[test]
    fn version_and_kind_are_checked() {
        let mut snap = LedgerSnapshot::capture("toy", Toy { total: 1 }).unwrap();
        assert!(matches!(
            snap.clone().into_state("other"),
            Err(LedgerError::SnapshotKind { .. })
        ));
        snap.schema_version = 0;
        assert_eq!(
            snap.into_state("toy").unwrap_err(),
            LedgerError::UnsupportedSchema {
                found: 0,
                expected: SCHEMA_VERSION
            }
        );
    }

    #[test]
    fn json_round_trip_keeps_root_valid() {
        let snap = LedgerSnapshot::capture("toy", Toy { total: 42 }).unwrap();
        let raw = snap.to_json().unwrap();
        let back: LedgerSnapshot<Toy> = LedgerSnapshot::from_json(&raw).unwrap();
        assert_eq!(back.into_state("toy").unwrap().total, 42);
    }
}
