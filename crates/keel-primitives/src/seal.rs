use keel_crypto::{SigningKey, VerifyingKey};
use keel_types::{
    ContainerLite, DebindingLite, DynamicBindingLite, Ghid, IdentityLite, LiteObject, ObjectKind,
    RequestLite, StaticBindingLite,
};

use crate::wire::{
    frame, ContainerBody, DebindingBody, DynamicBindingBody, IdentityBody, RequestBody,
    StaticBindingBody,
};

/// A freshly-sealed primitive: canonical packed bytes plus the lite view.
///
/// Locally-created objects are already trusted, but they still pass through
/// the same ingestion pipeline as bytes received from a peer.
#[derive(Clone, Debug)]
pub struct Sealed {
    pub packed: Vec<u8>,
    pub lite: LiteObject,
}

fn encode_body<T: serde::Serialize>(body: &T) -> Vec<u8> {
    // The body structs contain nothing bincode can fail on.
    bincode::serialize(body).expect("primitive body serialization cannot fail")
}

/// A signing identity together with its sealed identity record.
///
/// This is the author-side entry point: generate a `FirstParty`, ingest its
/// identity record, then seal containers and bindings against it.
pub struct FirstParty {
    key: SigningKey,
    ghid: Ghid,
    packed_identity: Vec<u8>,
}

impl FirstParty {
    /// Generate a fresh identity and seal its identity record.
    pub fn generate() -> Self {
        Self::from_key(SigningKey::generate())
    }

    /// Build from an existing signing key.
    pub fn from_key(key: SigningKey) -> Self {
        let body = encode_body(&IdentityBody {
            public_key: key.verifying_key().as_bytes(),
        });
        let packed_identity = frame(ObjectKind::Identity, &body);
        let ghid = Ghid::from_packed(&packed_identity);
        Self {
            key,
            ghid,
            packed_identity,
        }
    }

    /// The ghid of this identity record; the `author` field of everything
    /// this party seals.
    pub fn ghid(&self) -> Ghid {
        self.ghid
    }

    /// The public verifying key.
    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }

    /// The packed identity record (unsigned; the trust anchor).
    pub fn identity_packed(&self) -> &[u8] {
        &self.packed_identity
    }

    /// The lite view of the identity record.
    pub fn identity_lite(&self) -> IdentityLite {
        IdentityLite {
            ghid: self.ghid,
            public_key: self.key.verifying_key().as_bytes(),
        }
    }

    fn seal_signed(&self, kind: ObjectKind, body: &[u8]) -> Vec<u8> {
        let mut packed = frame(kind, body);
        let signature = self.key.sign(&packed);
        packed.extend_from_slice(&signature.to_bytes());
        packed
    }

    /// Seal an immutable container around an (already encrypted) payload.
    pub fn seal_container(&self, payload: &[u8]) -> Sealed {
        let body = encode_body(&ContainerBody {
            author: self.ghid,
            payload: payload.to_vec(),
        });
        let packed = self.seal_signed(ObjectKind::Container, &body);
        let lite = LiteObject::Container(ContainerLite {
            ghid: Ghid::from_packed(&packed),
            author: self.ghid,
        });
        Sealed { packed, lite }
    }

    /// Seal a static binding onto `target`.
    pub fn seal_static_binding(&self, target: Ghid) -> Sealed {
        let body = encode_body(&StaticBindingBody {
            author: self.ghid,
            target,
        });
        let packed = self.seal_signed(ObjectKind::StaticBinding, &body);
        let lite = LiteObject::StaticBinding(StaticBindingLite {
            ghid: Ghid::from_packed(&packed),
            author: self.ghid,
            target,
        });
        Sealed { packed, lite }
    }

    /// Seal one frame of a dynamic binding.
    ///
    /// `address` is the stable address shared by every frame; pick it with
    /// [`Ghid::pseudorandom`] for a genesis frame and reuse it afterwards.
    /// `target_vector` is head-first history; successive frames must carry a
    /// strictly increasing `counter` or the engine will reject them.
    pub fn seal_dynamic_frame(
        &self,
        address: Ghid,
        counter: u64,
        target_vector: Vec<Ghid>,
    ) -> Sealed {
        let body = encode_body(&DynamicBindingBody {
            author: self.ghid,
            address,
            counter,
            target_vector: target_vector.clone(),
        });
        let packed = self.seal_signed(ObjectKind::DynamicBinding, &body);
        let lite = LiteObject::DynamicBinding(DynamicBindingLite {
            ghid: address,
            author: self.ghid,
            counter,
            target_vector,
            frame_ghid: Ghid::from_packed(&packed),
        });
        Sealed { packed, lite }
    }

    /// Seal a debinding revoking `target`.
    pub fn seal_debinding(&self, target: Ghid) -> Sealed {
        let body = encode_body(&DebindingBody {
            author: self.ghid,
            target,
        });
        let packed = self.seal_signed(ObjectKind::Debinding, &body);
        let lite = LiteObject::Debinding(DebindingLite {
            ghid: Ghid::from_packed(&packed),
            author: self.ghid,
            target,
        });
        Sealed { packed, lite }
    }
}

impl std::fmt::Debug for FirstParty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FirstParty({})", self.ghid)
    }
}

/// Seal an asymmetric request to `recipient`.
///
/// Requests are opaque to store-and-forward nodes, so no signing key is
/// involved at this layer; any authentication lives inside the payload.
pub fn seal_request(recipient: Ghid, payload: &[u8]) -> Sealed {
    let body = encode_body(&RequestBody {
        recipient,
        payload: payload.to_vec(),
    });
    let packed = frame(ObjectKind::Request, &body);
    let lite = LiteObject::Request(RequestLite {
        ghid: Ghid::from_packed(&packed),
        recipient,
    });
    Sealed { packed, lite }
}
