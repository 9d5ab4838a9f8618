//! Invites and the join payload codec
//!
//! The payload layout is private to this crate; callers only copy the bytes.
//!
//! ```text
//! offset  size  field
//! 0       4     magic "QARI"
//! 4       1     version
//! 5       16    session id
//! 21      32    join secret
//! 53      8     expiry, unix seconds, big endian (0 = never)
//! 61      8     SHA-256 of bytes 0..61, truncated
//! ```

use crate::ids::{SessionId, ID_LENGTH};
use crate::{Error, Result};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

const MAGIC: &[u8; 4] = b"QARI";
const VERSION: u8 = 1;
const SECRET_LENGTH: usize = 32;
const CHECKSUM_LENGTH: usize = 8;
const BODY_LENGTH: usize = 4 + 1 + ID_LENGTH + SECRET_LENGTH + 8;

/// Size in bytes of every invite payload
pub const INVITE_PAYLOAD_LENGTH: usize = BODY_LENGTH + CHECKSUM_LENGTH;

/// Join secret shared by a logical session and its invites
pub(crate) type JoinSecret = [u8; SECRET_LENGTH];

pub(crate) fn generate_secret() -> JoinSecret {
    use rand::RngCore;

    let mut secret = [0u8; SECRET_LENGTH];
    rand::thread_rng().fill_bytes(&mut secret);
    secret
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Compare secrets without short-circuiting on the first mismatch
pub(crate) fn secrets_match(a: &JoinSecret, b: &JoinSecret) -> bool {
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn checksum(body: &[u8]) -> [u8; CHECKSUM_LENGTH] {
    let digest = Sha256::digest(body);
    let mut out = [0u8; CHECKSUM_LENGTH];
    out.copy_from_slice(&digest[..CHECKSUM_LENGTH]);
    out
}

/// Decoded join credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct InvitePayload {
    pub session_id: SessionId,
    pub secret: JoinSecret,
    /// Unix seconds, `None` when the invite never expires
    pub expires_at: Option<u64>,
}

impl InvitePayload {
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(INVITE_PAYLOAD_LENGTH);
        bytes.extend_from_slice(MAGIC);
        bytes.push(VERSION);
        bytes.extend_from_slice(self.session_id.as_bytes());
        bytes.extend_from_slice(&self.secret);
        bytes.extend_from_slice(&self.expires_at.unwrap_or(0).to_be_bytes());
        let sum = checksum(&bytes);
        bytes.extend_from_slice(&sum);
        bytes
    }

    /// Parse and verify a payload
    ///
    /// Fails with `InvalidInvite` if the bytes are truncated, tampered with,
    /// from another version, or expired at `now` (unix seconds).
    pub fn decode(bytes: &[u8], now: u64) -> Result<Self> {
        if bytes.len() != INVITE_PAYLOAD_LENGTH {
            return Err(Error::InvalidInvite(format!(
                "payload is {} bytes, expected {}",
                bytes.len(),
                INVITE_PAYLOAD_LENGTH
            )));
        }

        let (body, sum) = bytes.split_at(BODY_LENGTH);
        if body[..4] != MAGIC[..] {
            return Err(Error::InvalidInvite("payload is not an invite".to_string()));
        }

        if body[4] != VERSION {
            return Err(Error::InvalidInvite(format!(
                "unsupported invite version {}",
                body[4]
            )));
        }

        if checksum(body)[..] != *sum {
            return Err(Error::InvalidInvite("payload checksum mismatch".to_string()));
        }

        let mut id = [0u8; ID_LENGTH];
        id.copy_from_slice(&body[5..5 + ID_LENGTH]);
        let mut secret = [0u8; SECRET_LENGTH];
        secret.copy_from_slice(&body[5 + ID_LENGTH..5 + ID_LENGTH + SECRET_LENGTH]);
        let mut expiry = [0u8; 8];
        expiry.copy_from_slice(&body[BODY_LENGTH - 8..]);

        let expires_at = match u64::from_be_bytes(expiry) {
            0 => None,
            at => Some(at),
        };

        let session_id = SessionId::from_bytes(id);
        if let Some(at) = expires_at {
            if now >= at {
                return Err(Error::InvalidInvite(format!(
                    "invite for session {} expired",
                    session_id
                )));
            }
        }

        Ok(Self {
            session_id,
            secret,
            expires_at,
        })
    }
}

/// Creation artifact of a new logical session
///
/// The invite object belongs to its creator and may be dropped as soon as
/// its payload has been copied. Copies of [`Invite::data`] stay valid join
/// credentials independently of this object.
#[derive(Clone, PartialEq, Eq)]
pub struct Invite {
    session_id: SessionId,
    data: Vec<u8>,
}

impl Invite {
    pub(crate) fn new(payload: &InvitePayload) -> Self {
        Self {
            session_id: payload.session_id,
            data: payload.encode(),
        }
    }

    /// Id of the session this invite joins
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Payload bytes to hand to joining peers
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_size(&self) -> usize {
        self.data.len()
    }

    /// Owned copy of the payload
    pub fn to_bytes(&self) -> Vec<u8> {
        self.data.clone()
    }

    /// Read the session id embedded in a payload copy
    pub fn peek_session_id(data: &[u8]) -> Result<SessionId> {
        InvitePayload::decode(data, unix_now()).map(|p| p.session_id)
    }
}

impl std::fmt::Debug for Invite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The payload carries the join secret
        f.debug_struct("Invite")
            .field("session_id", &self.session_id)
            .field("data_size", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(expires_at: Option<u64>) -> InvitePayload {
        InvitePayload {
            session_id: SessionId::generate(),
            secret: generate_secret(),
            expires_at,
        }
    }

    #[test]
    fn test_payload_decodes_to_same_fields() {
        let original = payload(None);
        let bytes = original.encode();
        assert_eq!(bytes.len(), INVITE_PAYLOAD_LENGTH);
        assert_eq!(InvitePayload::decode(&bytes, unix_now()).unwrap(), original);
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let mut bytes = payload(None).encode();
        bytes[10] ^= 0x01;
        let err = InvitePayload::decode(&bytes, unix_now()).unwrap_err();
        assert!(matches!(err, Error::InvalidInvite(_)));
    }

    #[test]
    fn test_truncated_and_foreign_payloads() {
        let bytes = payload(None).encode();
        assert!(InvitePayload::decode(&bytes[..20], unix_now()).is_err());
        assert!(InvitePayload::decode(&[0u8; INVITE_PAYLOAD_LENGTH], unix_now()).is_err());
        assert!(InvitePayload::decode(b"hello", unix_now()).is_err());
    }

    #[test]
    fn test_expiry() {
        let bytes = payload(Some(1_000)).encode();
        assert!(InvitePayload::decode(&bytes, 999).is_ok());
        assert!(matches!(
            InvitePayload::decode(&bytes, 1_000),
            Err(Error::InvalidInvite(_))
        ));
    }

    #[test]
    fn test_invite_accessors() {
        let p = payload(None);
        let invite = Invite::new(&p);
        assert_eq!(invite.session_id(), p.session_id);
        assert_eq!(invite.data_size(), INVITE_PAYLOAD_LENGTH);

        let copy = invite.to_bytes();
        drop(invite);
        assert_eq!(Invite::peek_session_id(&copy).unwrap(), p.session_id);
    }

    #[test]
    fn test_secrets_match() {
        let a = generate_secret();
        let mut b = a;
        assert!(secrets_match(&a, &b));
        b[31] ^= 0xff;
        assert!(!secrets_match(&a, &b));
    }
}
