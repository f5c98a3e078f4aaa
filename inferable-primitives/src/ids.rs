//! Machine identifier types.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::Error;

const MAX_ID_LEN: usize = 128;
const DERIVED_LEN: usize = 8;
const DERIVED_PREFIX: &str = "rs-";
const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz";

/// Identifier for one running client process, sent as `X-Machine-ID` on
/// every control-plane request.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MachineId(String);

impl MachineId {
    /// Creates a machine identifier after validating it is header safe.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMachineId`] if the identifier is empty, too
    /// long, or contains whitespace or non-ASCII characters.
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(Error::InvalidMachineId {
                id,
                reason: "identifier cannot be empty".into(),
            });
        }
        if id.len() > MAX_ID_LEN {
            return Err(Error::InvalidMachineId {
                id,
                reason: format!("identifier length must be <= {MAX_ID_LEN}"),
            });
        }
        if !id.bytes().all(|b| b.is_ascii_graphic()) {
            return Err(Error::InvalidMachineId {
                id,
                reason: "identifier must be printable ASCII without whitespace".into(),
            });
        }
        Ok(Self(id))
    }

    /// Derives the identifier for the current host.
    ///
    /// The value depends only on the hostname, CPU architecture and operating
    /// system, so every client constructed on the same host agrees on it.
    #[must_use]
    pub fn derive() -> Self {
        Self::derive_from(&host_fingerprint())
    }

    /// Derives an identifier from an arbitrary fingerprint string.
    #[must_use]
    pub fn derive_from(fingerprint: &str) -> Self {
        let digest = Sha256::digest(fingerprint.as_bytes());
        let suffix: String = digest
            .iter()
            .take(DERIVED_LEN)
            .map(|byte| char::from(CHARSET[usize::from(*byte) % CHARSET.len()]))
            .collect();
        Self(format!("{DERIVED_PREFIX}{suffix}"))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn host_fingerprint() -> String {
    let host = hostname::get()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown-host".to_owned());
    format!(
        "{host}{}{}",
        std::env::consts::ARCH,
        std::env::consts::OS
    )
}

impl Display for MachineId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<MachineId> for String {
    fn from(value: MachineId) -> Self {
        value.0
    }
}

impl TryFrom<String> for MachineId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl FromStr for MachineId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_id_is_stable() {
        assert_eq!(MachineId::derive(), MachineId::derive());
        assert_eq!(
            MachineId::derive_from("host-a"),
            MachineId::derive_from("host-a")
        );
    }

    #[test]
    fn derived_id_shape() {
        let id = MachineId::derive_from("build-box");
        let suffix = id.as_str().strip_prefix("rs-").expect("prefix");
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_lowercase()));
        assert_ne!(id, MachineId::derive_from("other-box"));
    }

    #[test]
    fn explicit_ids_are_validated() {
        assert!(MachineId::new("random-machine-id").is_ok());
        assert!(matches!(
            MachineId::new(""),
            Err(Error::InvalidMachineId { .. })
        ));
        assert!(MachineId::new("has space").is_err());
        assert!(MachineId::new("x".repeat(MAX_ID_LEN + 1)).is_err());
    }

    #[test]
    fn round_trip_machine_id() {
        let id = MachineId::new("machine-1").unwrap();
        let parsed = id.to_string().parse::<MachineId>().expect("parse");
        assert_eq!(id, parsed);

        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"machine-1\"");
        assert!(serde_json::from_str::<MachineId>("\"\"").is_err());
    }
}
