//! Fixed-length byte identifiers
//!
//! Session, peer and scene object ids are 16 opaque bytes, printed as
//! colon-separated upper-case hex (`0A:1B:...`).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Length in bytes of every identifier
pub const ID_LENGTH: usize = 16;

/// Format bytes as colon-separated upper-case hex
pub fn format_hex_id(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":")
}

/// Parse colon-separated hex back into a fixed-length id
fn parse_hex_id(text: &str) -> Option<[u8; ID_LENGTH]> {
    let compact: String = text.chars().filter(|c| *c != ':').collect();
    let decoded = hex::decode(compact).ok()?;
    decoded.try_into().ok()
}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name([u8; ID_LENGTH]);

        impl $name {
            /// Allocate a fresh random id
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().into_bytes())
            }

            /// Wrap raw bytes
            pub const fn from_bytes(bytes: [u8; ID_LENGTH]) -> Self {
                Self(bytes)
            }

            /// Raw bytes of this id
            pub fn as_bytes(&self) -> &[u8; ID_LENGTH] {
                &self.0
            }

            /// Parse the colon-separated hex form produced by `Display`
            pub fn parse(text: &str) -> Option<Self> {
                parse_hex_id(text).map(Self)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&format_hex_id(&self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }
    };
}

define_id!(
    /// Identifier of a logical session, shared by every joined peer
    SessionId
);
define_id!(
    /// Identifier of a peer inside a session
    PeerId
);
define_id!(
    /// Identifier of a GUI panel, unique within its session
    GuiPanelId
);
define_id!(
    /// Identifier of an app volume, unique within its session
    AppVolumeId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_hex_id() {
        assert_eq!(format_hex_id(&[0x0a, 0xff, 0x00]), "0A:FF:00");
        assert_eq!(format_hex_id(&[]), "");
    }

    #[test]
    fn test_display_and_parse() {
        let id = SessionId::from_bytes([0xab; ID_LENGTH]);
        let text = id.to_string();
        assert_eq!(text.len(), ID_LENGTH * 3 - 1);
        assert!(text.starts_with("AB:AB"));
        assert_eq!(SessionId::parse(&text), Some(id));
    }

    #[test]
    fn test_parse_rejects_wrong_length() {
        assert_eq!(PeerId::parse("AB:CD"), None);
        assert_eq!(PeerId::parse("not hex"), None);
    }

    #[test]
    fn test_generated_ids_differ() {
        let a = GuiPanelId::generate();
        let b = GuiPanelId::generate();
        assert_ne!(a, b);
    }
}
