use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::ghid::Ghid;

/// Discriminant for the six wire primitive kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    Identity,
    Container,
    StaticBinding,
    DynamicBinding,
    Debinding,
    Request,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Identity => "Identity",
            Self::Container => "Container",
            Self::StaticBinding => "StaticBinding",
            Self::DynamicBinding => "DynamicBinding",
            Self::Debinding => "Debinding",
            Self::Request => "Request",
        };
        f.write_str(name)
    }
}

/// Lightweight description of an identity record.
///
/// Binds a public key to a ghid; the authorship anchor for every other kind.
#[derive(Clone, Debug, Eq, Serialize, Deserialize)]
pub struct IdentityLite {
    pub ghid: Ghid,
    /// Raw ed25519 public key bytes, opaque at this layer.
    pub public_key: [u8; 32],
}

/// Lightweight description of an immutable encrypted container.
#[derive(Clone, Debug, Eq, Serialize, Deserialize)]
pub struct ContainerLite {
    pub ghid: Ghid,
    pub author: Ghid,
}

/// Lightweight description of a static binding.
#[derive(Clone, Debug, Eq, Serialize, Deserialize)]
pub struct StaticBindingLite {
    pub ghid: Ghid,
    pub author: Ghid,
    pub target: Ghid,
}

/// Lightweight description of one frame of a dynamic binding.
///
/// `ghid` is the stable address shared by every frame; `frame_ghid`
/// identifies this particular revision.
#[derive(Clone, Debug, Eq, Serialize, Deserialize)]
pub struct DynamicBindingLite {
    pub ghid: Ghid,
    pub author: Ghid,
    pub counter: u64,
    /// Target history, head first. Never empty.
    pub target_vector: Vec<Ghid>,
    pub frame_ghid: Ghid,
}

impl DynamicBindingLite {
    /// The current target (head of the target vector).
    pub fn target(&self) -> Ghid {
        self.target_vector[0]
    }
}

/// Lightweight description of a debinding.
#[derive(Clone, Debug, Eq, Serialize, Deserialize)]
pub struct DebindingLite {
    pub ghid: Ghid,
    pub author: Ghid,
    pub target: Ghid,
}

/// Lightweight description of an asymmetric request.
#[derive(Clone, Debug, Eq, Serialize, Deserialize)]
pub struct RequestLite {
    pub ghid: Ghid,
    pub recipient: Ghid,
}

// Equality deliberately ignores payload-derived fields: two lite objects are
// the same object iff their identifying fields agree. Hashing is by ghid
// alone so equal objects always collide into the same bucket.

impl PartialEq for IdentityLite {
    fn eq(&self, other: &Self) -> bool {
        self.ghid == other.ghid
    }
}

impl PartialEq for ContainerLite {
    fn eq(&self, other: &Self) -> bool {
        self.ghid == other.ghid && self.author == other.author
    }
}

impl PartialEq for StaticBindingLite {
    fn eq(&self, other: &Self) -> bool {
        self.ghid == other.ghid && self.author == other.author && self.target == other.target
    }
}

impl PartialEq for DynamicBindingLite {
    fn eq(&self, other: &Self) -> bool {
        // Skip the history tail: it may legitimately vary between peers that
        // retain different amounts of it.
        self.ghid == other.ghid
            && self.author == other.author
            && self.target() == other.target()
            && self.frame_ghid == other.frame_ghid
    }
}

impl PartialEq for DebindingLite {
    fn eq(&self, other: &Self) -> bool {
        self.ghid == other.ghid && self.author == other.author
    }
}

impl PartialEq for RequestLite {
    fn eq(&self, other: &Self) -> bool {
        self.ghid == other.ghid && self.recipient == other.recipient
    }
}

macro_rules! hash_by_ghid {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Hash for $ty {
                fn hash<H: Hasher>(&self, state: &mut H) {
                    self.ghid.hash(state);
                }
            }
        )*
    };
}

hash_by_ghid!(
    IdentityLite,
    ContainerLite,
    StaticBindingLite,
    DynamicBindingLite,
    DebindingLite,
    RequestLite,
);

/// Lightweight, payload-free view of any wire primitive.
///
/// This is what the persistence engine stores, validates, and hands to its
/// collaborators; the full packed bytes travel alongside it separately.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiteObject {
    Identity(IdentityLite),
    Container(ContainerLite),
    StaticBinding(StaticBindingLite),
    DynamicBinding(DynamicBindingLite),
    Debinding(DebindingLite),
    Request(RequestLite),
}

impl LiteObject {
    /// The object's primary ghid (the stable address for dynamic bindings).
    pub fn ghid(&self) -> Ghid {
        match self {
            Self::Identity(o) => o.ghid,
            Self::Container(o) => o.ghid,
            Self::StaticBinding(o) => o.ghid,
            Self::DynamicBinding(o) => o.ghid,
            Self::Debinding(o) => o.ghid,
            Self::Request(o) => o.ghid,
        }
    }

    /// The kind discriminant.
    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::Identity(_) => ObjectKind::Identity,
            Self::Container(_) => ObjectKind::Container,
            Self::StaticBinding(_) => ObjectKind::StaticBinding,
            Self::DynamicBinding(_) => ObjectKind::DynamicBinding,
            Self::Debinding(_) => ObjectKind::Debinding,
            Self::Request(_) => ObjectKind::Request,
        }
    }

    /// The ghid re-ingestion is deduplicated on: the frame ghid for dynamic
    /// bindings (frames share a stable address), the primary ghid otherwise.
    pub fn dedup_ghid(&self) -> Ghid {
        match self {
            Self::DynamicBinding(o) => o.frame_ghid,
            other => other.ghid(),
        }
    }
}

impl Hash for LiteObject {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ghid().hash(state);
    }
}

impl fmt::Display for LiteObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind(), self.ghid())
    }
}
