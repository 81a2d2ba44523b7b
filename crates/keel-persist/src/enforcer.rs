use std::sync::Arc;

use keel_types::{
    DebindingLite, DynamicBindingLite, Ghid, LiteObject, ObjectKind, StaticBindingLite,
};
use tracing::{debug, warn};

use crate::error::{PersistError, PersistResult};
use crate::librarian::Librarian;

/// Whether a binding may point at an object of this kind.
///
/// Bindings hold content alive, so they may target containers and dynamic
/// bindings only. The debinding rule is deliberately looser.
pub(crate) fn binding_target_is_legal(kind: ObjectKind) -> bool {
    matches!(kind, ObjectKind::Container | ObjectKind::DynamicBinding)
}

/// Whether a debinding may point at an object of this kind.
///
/// Debindings revoke relationships, not content: anything except identity
/// records and containers is fair game, including other debindings.
pub(crate) fn debinding_target_is_legal(kind: ObjectKind) -> bool {
    !matches!(kind, ObjectKind::Identity | ObjectKind::Container)
}

/// Validates target selections against the local index.
///
/// Unknown targets pass on trust: the target may simply not have arrived
/// yet, and [`Librarian::is_debound`] revalidates recorded debindings once
/// it does.
pub struct Enforcer {
    librarian: Arc<dyn Librarian>,
}

impl Enforcer {
    pub fn new(librarian: Arc<dyn Librarian>) -> Self {
        Self { librarian }
    }

    pub async fn validate_static_binding(&self, obj: &StaticBindingLite) -> PersistResult<()> {
        self.check_binding_target(&LiteObject::StaticBinding(obj.clone()), obj.target)
            .await
    }

    pub async fn validate_dynamic_binding(&self, obj: &DynamicBindingLite) -> PersistResult<()> {
        self.check_binding_target(&LiteObject::DynamicBinding(obj.clone()), obj.target())
            .await?;
        self.check_frame_progression(obj).await
    }

    pub async fn validate_debinding(&self, obj: &DebindingLite) -> PersistResult<()> {
        match self.librarian.summarize(obj.target).await {
            Ok(target) => {
                if !debinding_target_is_legal(target.kind()) {
                    return Err(PersistError::InvalidTarget {
                        object: LiteObject::Debinding(obj.clone()).to_string(),
                        target: target.to_string(),
                    });
                }
                Ok(())
            }
            Err(PersistError::DoesNotExist(_)) => {
                warn!(debinding = %obj.ghid, target = %obj.target, "debinding target unknown, accepting on trust");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn check_binding_target(&self, obj: &LiteObject, target: Ghid) -> PersistResult<()> {
        match self.librarian.summarize(target).await {
            Ok(found) => {
                if !binding_target_is_legal(found.kind()) {
                    return Err(PersistError::InvalidTarget {
                        object: obj.to_string(),
                        target: found.to_string(),
                    });
                }
                Ok(())
            }
            Err(PersistError::DoesNotExist(_)) => {
                debug!(binding = %obj, %target, "binding target unknown, accepting on trust");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Frames at a known address must carry a strictly increasing counter.
    async fn check_frame_progression(&self, obj: &DynamicBindingLite) -> PersistResult<()> {
        match self.librarian.summarize(obj.ghid).await {
            Ok(LiteObject::DynamicBinding(existing)) => {
                if existing.counter >= obj.counter {
                    debug!(
                        address = %obj.ghid,
                        existing_frame = %existing.frame_ghid,
                        proposed_frame = %obj.frame_ghid,
                        "rejecting stale frame"
                    );
                    return Err(PersistError::IllegalDynamicFrame {
                        address: obj.ghid,
                        existing: existing.counter,
                        proposed: obj.counter,
                    });
                }
                Ok(())
            }
            Ok(other) => Err(PersistError::MalformedPrimitive(format!(
                "dynamic address {} collides with existing {}",
                obj.ghid, other
            ))),
            Err(PersistError::DoesNotExist(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::librarian::MemoryLibrarian;
    use keel_types::{ContainerLite, IdentityLite, RequestLite};

    fn g(seed: u8) -> Ghid {
        Ghid::from_raw([seed; 32])
    }

    fn setup() -> (Arc<MemoryLibrarian>, Enforcer) {
        let librarian = MemoryLibrarian::shared();
        let enforcer = Enforcer::new(librarian.clone());
        (librarian, enforcer)
    }

    fn static_binding(ghid: u8, target: u8) -> StaticBindingLite {
        StaticBindingLite {
            ghid: g(ghid),
            author: g(2),
            target: g(target),
        }
    }

    fn dynamic_frame(counter: u64, frame_ghid: u8) -> DynamicBindingLite {
        DynamicBindingLite {
            ghid: g(1),
            author: g(2),
            counter,
            target_vector: vec![g(3)],
            frame_ghid: g(frame_ghid),
        }
    }

    #[tokio::test]
    async fn binding_to_unknown_target_passes_on_trust() {
        let (_librarian, enforcer) = setup();
        enforcer
            .validate_static_binding(&static_binding(1, 99))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn binding_to_container_is_legal() {
        let (librarian, enforcer) = setup();
        let container = LiteObject::Container(ContainerLite { ghid: g(3), author: g(2) });
        librarian.store(&container, b"c").await.unwrap();
        enforcer
            .validate_static_binding(&static_binding(1, 3))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn binding_to_identity_is_rejected() {
        let (librarian, enforcer) = setup();
        let identity = LiteObject::Identity(IdentityLite { ghid: g(3), public_key: [0; 32] });
        librarian.store(&identity, b"i").await.unwrap();
        let err = enforcer
            .validate_static_binding(&static_binding(1, 3))
            .await
            .unwrap_err();
        assert!(matches!(err, PersistError::InvalidTarget { .. }));
    }

    #[tokio::test]
    async fn binding_to_dynamic_binding_is_legal() {
        let (librarian, enforcer) = setup();
        librarian
            .store(&LiteObject::DynamicBinding(dynamic_frame(0, 10)), b"f")
            .await
            .unwrap();
        enforcer
            .validate_static_binding(&static_binding(5, 1))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn debinding_may_target_binding_and_request_but_not_container() {
        let (librarian, enforcer) = setup();
        librarian
            .store(&LiteObject::StaticBinding(static_binding(3, 4)), b"b")
            .await
            .unwrap();
        librarian
            .store(
                &LiteObject::Request(RequestLite { ghid: g(5), recipient: g(2) }),
                b"r",
            )
            .await
            .unwrap();
        librarian
            .store(
                &LiteObject::Container(ContainerLite { ghid: g(6), author: g(2) }),
                b"c",
            )
            .await
            .unwrap();

        let debinding = |target: u8| DebindingLite {
            ghid: g(9),
            author: g(2),
            target: g(target),
        };
        enforcer.validate_debinding(&debinding(3)).await.unwrap();
        enforcer.validate_debinding(&debinding(5)).await.unwrap();
        let err = enforcer.validate_debinding(&debinding(6)).await.unwrap_err();
        assert!(matches!(err, PersistError::InvalidTarget { .. }));
    }

    #[tokio::test]
    async fn frame_counter_must_strictly_increase() {
        let (librarian, enforcer) = setup();
        librarian
            .store(&LiteObject::DynamicBinding(dynamic_frame(5, 10)), b"f")
            .await
            .unwrap();

        enforcer
            .validate_dynamic_binding(&dynamic_frame(6, 11))
            .await
            .unwrap();

        let err = enforcer
            .validate_dynamic_binding(&dynamic_frame(5, 12))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PersistError::IllegalDynamicFrame { existing: 5, proposed: 5, .. }
        ));

        let err = enforcer
            .validate_dynamic_binding(&dynamic_frame(4, 13))
            .await
            .unwrap_err();
        assert!(matches!(err, PersistError::IllegalDynamicFrame { .. }));
    }

    #[tokio::test]
    async fn genesis_frame_passes_without_prior_state() {
        let (_librarian, enforcer) = setup();
        enforcer
            .validate_dynamic_binding(&dynamic_frame(0, 10))
            .await
            .unwrap();
    }
}
