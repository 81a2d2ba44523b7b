use serde::{Deserialize, Serialize};

use keel_crypto::{Signature, VerifyingKey, SIGNATURE_LEN};
use keel_types::{
    ContainerLite, DebindingLite, DynamicBindingLite, Ghid, IdentityLite, LiteObject, ObjectKind,
    RequestLite, StaticBindingLite,
};

use crate::error::{PrimitiveError, PrimitiveResult};

/// Byte length of the magic prefix.
pub const MAGIC_LEN: usize = 4;
/// Byte length of the fixed header (magic + body length).
pub const HEADER_LEN: usize = MAGIC_LEN + 4;
/// Ceiling on the bincode body, matching the engine's ingest limit.
pub const MAX_BODY_SIZE: usize = 16 * 1024 * 1024;

const MAGIC_IDENTITY: [u8; 4] = *b"IDNT";
const MAGIC_CONTAINER: [u8; 4] = *b"CONT";
const MAGIC_STATIC_BINDING: [u8; 4] = *b"BIND";
const MAGIC_DYNAMIC_BINDING: [u8; 4] = *b"DYNB";
const MAGIC_DEBINDING: [u8; 4] = *b"DBND";
const MAGIC_REQUEST: [u8; 4] = *b"AREQ";

/// The kind a magic prefix denotes, if any.
pub fn kind_for_magic(magic: &[u8; 4]) -> Option<ObjectKind> {
    match *magic {
        MAGIC_IDENTITY => Some(ObjectKind::Identity),
        MAGIC_CONTAINER => Some(ObjectKind::Container),
        MAGIC_STATIC_BINDING => Some(ObjectKind::StaticBinding),
        MAGIC_DYNAMIC_BINDING => Some(ObjectKind::DynamicBinding),
        MAGIC_DEBINDING => Some(ObjectKind::Debinding),
        MAGIC_REQUEST => Some(ObjectKind::Request),
        _ => None,
    }
}

/// The magic prefix for a kind.
pub fn magic_for_kind(kind: ObjectKind) -> [u8; 4] {
    match kind {
        ObjectKind::Identity => MAGIC_IDENTITY,
        ObjectKind::Container => MAGIC_CONTAINER,
        ObjectKind::StaticBinding => MAGIC_STATIC_BINDING,
        ObjectKind::DynamicBinding => MAGIC_DYNAMIC_BINDING,
        ObjectKind::Debinding => MAGIC_DEBINDING,
        ObjectKind::Request => MAGIC_REQUEST,
    }
}

fn is_signed_kind(kind: ObjectKind) -> bool {
    !matches!(kind, ObjectKind::Identity | ObjectKind::Request)
}

// Bincode-encoded body layouts. These are the canonical wire structures; any
// change here is a wire-format break.

#[derive(Serialize, Deserialize)]
pub(crate) struct IdentityBody {
    pub public_key: [u8; 32],
}

#[derive(Serialize, Deserialize)]
pub(crate) struct ContainerBody {
    pub author: Ghid,
    pub payload: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
pub(crate) struct StaticBindingBody {
    pub author: Ghid,
    pub target: Ghid,
}

#[derive(Serialize, Deserialize)]
pub(crate) struct DynamicBindingBody {
    pub author: Ghid,
    pub address: Ghid,
    pub counter: u64,
    pub target_vector: Vec<Ghid>,
}

#[derive(Serialize, Deserialize)]
pub(crate) struct DebindingBody {
    pub author: Ghid,
    pub target: Ghid,
}

#[derive(Serialize, Deserialize)]
pub(crate) struct RequestBody {
    pub recipient: Ghid,
    pub payload: Vec<u8>,
}

pub(crate) fn frame(kind: ObjectKind, body: &[u8]) -> Vec<u8> {
    let mut packed = Vec::with_capacity(HEADER_LEN + body.len());
    packed.extend_from_slice(&magic_for_kind(kind));
    packed.extend_from_slice(&(body.len() as u32).to_be_bytes());
    packed.extend_from_slice(body);
    packed
}

/// A structurally-parsed primitive, ready for signature verification.
///
/// Parsing is a pure function of the input bytes and is fully reentrant;
/// callers may parse concurrently without coordination.
#[derive(Debug)]
pub struct Parsed {
    lite: LiteObject,
    /// The signed region: header plus body, excluding the signature itself.
    signed: Vec<u8>,
    signature: Option<Signature>,
}

impl Parsed {
    /// The lite view of the primitive.
    pub fn lite(&self) -> &LiteObject {
        &self.lite
    }

    /// Consume into the lite view.
    pub fn into_lite(self) -> LiteObject {
        self.lite
    }

    /// The identity ghid whose signature must be checked, if any.
    ///
    /// `None` for identity records (the trust anchor) and requests (opaque
    /// to a store-and-forward node).
    pub fn author_ghid(&self) -> Option<Ghid> {
        match &self.lite {
            LiteObject::Identity(_) | LiteObject::Request(_) => None,
            LiteObject::Container(o) => Some(o.author),
            LiteObject::StaticBinding(o) => Some(o.author),
            LiteObject::DynamicBinding(o) => Some(o.author),
            LiteObject::Debinding(o) => Some(o.author),
        }
    }

    /// Verify the trailing signature against the claimed author's key.
    pub fn verify(&self, key: &VerifyingKey) -> PrimitiveResult<()> {
        let signature = self
            .signature
            .as_ref()
            .ok_or_else(|| PrimitiveError::Unsigned(kind_name(self.lite.kind())))?;
        key.verify(&self.signed, signature)
            .map_err(|_| PrimitiveError::VerificationFailure(self.lite.to_string()))
    }
}

fn kind_name(kind: ObjectKind) -> &'static str {
    match kind {
        ObjectKind::Identity => "identity",
        ObjectKind::Container => "container",
        ObjectKind::StaticBinding => "static binding",
        ObjectKind::DynamicBinding => "dynamic binding",
        ObjectKind::Debinding => "debinding",
        ObjectKind::Request => "request",
    }
}

fn decode_body<'a, T: Deserialize<'a>>(kind: &'static str, body: &'a [u8]) -> PrimitiveResult<T> {
    bincode::deserialize(body).map_err(|e| PrimitiveError::MalformedBody {
        kind,
        reason: e.to_string(),
    })
}

/// Parse packed bytes into a [`Parsed`] primitive.
///
/// Dispatches on the 4-byte magic prefix; unknown magic fails with
/// [`PrimitiveError::UnknownMagic`]. The returned object has passed only
/// structural checks; authorship must still be verified by the caller.
pub fn parse(packed: &[u8]) -> PrimitiveResult<Parsed> {
    if packed.len() < HEADER_LEN {
        return Err(PrimitiveError::Truncated {
            have: packed.len(),
            need: HEADER_LEN,
        });
    }

    let mut magic = [0u8; MAGIC_LEN];
    magic.copy_from_slice(&packed[..MAGIC_LEN]);
    let kind = kind_for_magic(&magic).ok_or(PrimitiveError::UnknownMagic(magic))?;

    let body_len = u32::from_be_bytes(
        packed[MAGIC_LEN..HEADER_LEN]
            .try_into()
            .expect("header slice is 4 bytes"),
    ) as usize;
    if body_len > MAX_BODY_SIZE {
        return Err(PrimitiveError::BodyTooLarge {
            size: body_len,
            max: MAX_BODY_SIZE,
        });
    }

    let signed_len = HEADER_LEN + body_len;
    let total_len = if is_signed_kind(kind) {
        signed_len + SIGNATURE_LEN
    } else {
        signed_len
    };
    if packed.len() < total_len {
        return Err(PrimitiveError::Truncated {
            have: packed.len(),
            need: total_len,
        });
    }
    if packed.len() > total_len {
        return Err(PrimitiveError::TrailingBytes);
    }

    let body = &packed[HEADER_LEN..signed_len];
    let ghid = Ghid::from_packed(packed);

    let lite = match kind {
        ObjectKind::Identity => {
            let body: IdentityBody = decode_body("identity", body)?;
            LiteObject::Identity(IdentityLite {
                ghid,
                public_key: body.public_key,
            })
        }
        ObjectKind::Container => {
            let body: ContainerBody = decode_body("container", body)?;
            LiteObject::Container(ContainerLite {
                ghid,
                author: body.author,
            })
        }
        ObjectKind::StaticBinding => {
            let body: StaticBindingBody = decode_body("static binding", body)?;
            LiteObject::StaticBinding(StaticBindingLite {
                ghid,
                author: body.author,
                target: body.target,
            })
        }
        ObjectKind::DynamicBinding => {
            let body: DynamicBindingBody = decode_body("dynamic binding", body)?;
            if body.target_vector.is_empty() {
                return Err(PrimitiveError::MalformedBody {
                    kind: "dynamic binding",
                    reason: "empty target vector".into(),
                });
            }
            LiteObject::DynamicBinding(DynamicBindingLite {
                // The stable address comes from the body; the packed hash
                // identifies this frame alone.
                ghid: body.address,
                author: body.author,
                counter: body.counter,
                target_vector: body.target_vector,
                frame_ghid: ghid,
            })
        }
        ObjectKind::Debinding => {
            let body: DebindingBody = decode_body("debinding", body)?;
            LiteObject::Debinding(DebindingLite {
                ghid,
                author: body.author,
                target: body.target,
            })
        }
        ObjectKind::Request => {
            let body: RequestBody = decode_body("request", body)?;
            LiteObject::Request(RequestLite {
                ghid,
                recipient: body.recipient,
            })
        }
    };

    let signature = if is_signed_kind(kind) {
        let mut sig_bytes = [0u8; SIGNATURE_LEN];
        sig_bytes.copy_from_slice(&packed[signed_len..total_len]);
        Some(Signature::from_bytes(sig_bytes))
    } else {
        None
    };

    Ok(Parsed {
        lite,
        signed: packed[..signed_len].to_vec(),
        signature,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seal::{seal_request, FirstParty};

    #[test]
    fn magic_mapping_roundtrips() {
        for kind in [
            ObjectKind::Identity,
            ObjectKind::Container,
            ObjectKind::StaticBinding,
            ObjectKind::DynamicBinding,
            ObjectKind::Debinding,
            ObjectKind::Request,
        ] {
            assert_eq!(kind_for_magic(&magic_for_kind(kind)), Some(kind));
        }
    }

    #[test]
    fn unknown_magic_is_rejected() {
        let mut packed = b"NOPE".to_vec();
        packed.extend_from_slice(&0u32.to_be_bytes());
        let err = parse(&packed).unwrap_err();
        assert!(matches!(err, PrimitiveError::UnknownMagic(_)));
    }

    #[test]
    fn truncated_header_is_rejected() {
        let err = parse(b"CON").unwrap_err();
        assert!(matches!(err, PrimitiveError::Truncated { .. }));
    }

    #[test]
    fn truncated_signature_is_rejected() {
        let party = FirstParty::generate();
        let sealed = party.seal_container(b"payload");
        let short = &sealed.packed[..sealed.packed.len() - 1];
        let err = parse(short).unwrap_err();
        assert!(matches!(err, PrimitiveError::Truncated { .. }));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let party = FirstParty::generate();
        let mut packed = party.seal_container(b"payload").packed;
        packed.push(0);
        let err = parse(&packed).unwrap_err();
        assert!(matches!(err, PrimitiveError::TrailingBytes));
    }

    #[test]
    fn oversized_body_is_rejected() {
        let mut packed = MAGIC_CONTAINER.to_vec();
        packed.extend_from_slice(&(u32::MAX).to_be_bytes());
        let err = parse(&packed).unwrap_err();
        assert!(matches!(err, PrimitiveError::BodyTooLarge { .. }));
    }

    #[test]
    fn parse_recovers_container_fields() {
        let party = FirstParty::generate();
        let sealed = party.seal_container(b"secret payload");
        let parsed = parse(&sealed.packed).unwrap();
        assert_eq!(parsed.lite(), &sealed.lite);
        assert_eq!(parsed.author_ghid(), Some(party.ghid()));
    }

    #[test]
    fn parse_recovers_dynamic_frame_fields() {
        let party = FirstParty::generate();
        let address = Ghid::pseudorandom();
        let target = Ghid::pseudorandom();
        let sealed = party.seal_dynamic_frame(address, 3, vec![target]);
        let parsed = parse(&sealed.packed).unwrap();

        match parsed.into_lite() {
            LiteObject::DynamicBinding(frame) => {
                assert_eq!(frame.ghid, address);
                assert_eq!(frame.counter, 3);
                assert_eq!(frame.target(), target);
                assert_eq!(frame.frame_ghid, Ghid::from_packed(&sealed.packed));
            }
            other => panic!("wrong kind: {other}"),
        }
    }

    #[test]
    fn empty_target_vector_is_malformed() {
        let party = FirstParty::generate();
        let sealed = party.seal_dynamic_frame(Ghid::pseudorandom(), 0, vec![]);
        let err = parse(&sealed.packed).unwrap_err();
        assert!(matches!(err, PrimitiveError::MalformedBody { .. }));
    }

    #[test]
    fn signed_primitives_verify_against_author_key() {
        let party = FirstParty::generate();
        let sealed = party.seal_static_binding(Ghid::pseudorandom());
        let parsed = parse(&sealed.packed).unwrap();
        parsed.verify(&party.verifying_key()).unwrap();
    }

    #[test]
    fn tampered_body_fails_verification() {
        let party = FirstParty::generate();
        let mut packed = party.seal_debinding(Ghid::pseudorandom()).packed;
        // Flip one byte inside the body.
        packed[HEADER_LEN] ^= 0xff;
        let parsed = parse(&packed).unwrap();
        let err = parsed.verify(&party.verifying_key()).unwrap_err();
        assert!(matches!(err, PrimitiveError::VerificationFailure(_)));
    }

    #[test]
    fn wrong_key_fails_verification() {
        let party = FirstParty::generate();
        let other = FirstParty::generate();
        let parsed = parse(&party.seal_container(b"x").packed).unwrap();
        assert!(parsed.verify(&other.verifying_key()).is_err());
    }

    #[test]
    fn unsigned_kinds_have_no_author() {
        let party = FirstParty::generate();
        let identity = parse(party.identity_packed()).unwrap();
        assert_eq!(identity.author_ghid(), None);

        let request = seal_request(Ghid::pseudorandom(), b"opaque");
        let parsed = parse(&request.packed).unwrap();
        assert_eq!(parsed.author_ghid(), None);
    }

    #[test]
    fn verify_on_unsigned_kind_is_an_error() {
        let party = FirstParty::generate();
        let parsed = parse(party.identity_packed()).unwrap();
        let err = parsed.verify(&party.verifying_key()).unwrap_err();
        assert!(matches!(err, PrimitiveError::Unsigned(_)));
    }

    #[test]
    fn ghid_is_hash_of_packed_bytes() {
        let party = FirstParty::generate();
        let sealed = party.seal_container(b"hash me");
        assert_eq!(sealed.lite.ghid(), Ghid::from_packed(&sealed.packed));
    }
}
