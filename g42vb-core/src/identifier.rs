//! Composite identifiers for relationship resources
//!
//! Some resources describe a relationship that the remote API never assigns
//! an ID to (a floating IP bound to a server, for instance). Their identity
//! is synthesized by joining the key fields with `/`. The last field may be
//! empty, in which case the trailing delimiter is still written.

use std::fmt;
use std::str::FromStr;

use crate::provider::{ErrorKind, ProviderError};

/// Field delimiter of composite identifiers
pub const DELIMITER: char = '/';

/// Join the three association key fields into a composite identifier
pub fn encode(public_ip: &str, instance_id: &str, fixed_ip: &str) -> String {
    format!(
        "{}{}{}{}{}",
        public_ip, DELIMITER, instance_id, DELIMITER, fixed_ip
    )
}

/// Split a composite identifier into `(public_ip, instance_id, fixed_ip)`.
///
/// At least three fields are required. Extra fields are ignored: only the
/// first three positions are taken.
pub fn decode(id: &str) -> Result<(String, String, String), ProviderError> {
    let parts: Vec<&str> = id.split(DELIMITER).collect();
    if parts.len() < 3 {
        return Err(ProviderError::new(format!(
            "Unable to determine floating ip association ID from '{}': expected <public_ip>/<instance_id>/<fixed_ip>",
            id
        ))
        .with_kind(ErrorKind::MalformedIdentifier));
    }

    Ok((
        parts[0].to_string(),
        parts[1].to_string(),
        parts[2].to_string(),
    ))
}

/// Typed view of a floating IP association identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationId {
    pub public_ip: String,
    pub instance_id: String,
    /// `None` when the association is not pinned to a fixed address
    pub fixed_ip: Option<String>,
}

impl AssociationId {
    pub fn new(
        public_ip: impl Into<String>,
        instance_id: impl Into<String>,
        fixed_ip: Option<String>,
    ) -> Self {
        Self {
            public_ip: public_ip.into(),
            instance_id: instance_id.into(),
            fixed_ip: fixed_ip.filter(|ip| !ip.is_empty()),
        }
    }
}

impl fmt::Display for AssociationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode(
            &self.public_ip,
            &self.instance_id,
            self.fixed_ip.as_deref().unwrap_or(""),
        ))
    }
}

impl FromStr for AssociationId {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (public_ip, instance_id, fixed_ip) = decode(s)?;
        Ok(Self::new(public_ip, instance_id, Some(fixed_ip)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_joins_fields() {
        assert_eq!(
            encode("80.158.1.2", "3f6c9d21", "192.168.0.10"),
            "80.158.1.2/3f6c9d21/192.168.0.10"
        );
    }

    #[test]
    fn encode_keeps_trailing_delimiter_for_empty_fixed_ip() {
        assert_eq!(encode("80.158.1.2", "3f6c9d21", ""), "80.158.1.2/3f6c9d21/");
    }

    #[test]
    fn decode_round_trips() {
        let cases = [
            ("80.158.1.2", "3f6c9d21", "192.168.0.10"),
            ("80.158.1.2", "3f6c9d21", ""),
            ("", "", ""),
        ];
        for (a, b, c) in cases {
            let (x, y, z) = decode(&encode(a, b, c)).unwrap();
            assert_eq!((x.as_str(), y.as_str(), z.as_str()), (a, b, c));
        }
    }

    #[test]
    fn decode_rejects_fewer_than_two_separators() {
        for id in ["", "80.158.1.2", "80.158.1.2/3f6c9d21"] {
            let err = decode(id).unwrap_err();
            assert_eq!(err.kind, ErrorKind::MalformedIdentifier, "id: {:?}", id);
        }
    }

    #[test]
    fn decode_takes_first_three_fields() {
        let (public_ip, instance_id, fixed_ip) = decode("a/b/c/d/e").unwrap();
        assert_eq!(public_ip, "a");
        assert_eq!(instance_id, "b");
        assert_eq!(fixed_ip, "c");
    }

    #[test]
    fn association_id_maps_empty_fixed_ip_to_none() {
        let id: AssociationId = "80.158.1.2/3f6c9d21/".parse().unwrap();
        assert_eq!(id.fixed_ip, None);
        assert_eq!(id.to_string(), "80.158.1.2/3f6c9d21/");

        let pinned: AssociationId = "80.158.1.2/3f6c9d21/192.168.0.10".parse().unwrap();
        assert_eq!(pinned.fixed_ip.as_deref(), Some("192.168.0.10"));
    }
}
