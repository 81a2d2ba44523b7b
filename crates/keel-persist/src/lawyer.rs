use std::sync::Arc;

use async_trait::async_trait;
use keel_types::{DebindingLite, DynamicBindingLite, Ghid, LiteObject};
use tracing::debug;

use crate::error::{PersistError, PersistResult};
use crate::librarian::Librarian;

/// The author a debinding against `target` must carry, if the kind admits
/// debinding at all. Requests are revoked by their recipient.
pub(crate) fn debinding_author_expected(target: &LiteObject) -> Option<Ghid> {
    match target {
        LiteObject::StaticBinding(o) => Some(o.author),
        LiteObject::DynamicBinding(o) => Some(o.author),
        LiteObject::Debinding(o) => Some(o.author),
        LiteObject::Request(o) => Some(o.recipient),
        LiteObject::Identity(_) | LiteObject::Container(_) => None,
    }
}

/// Consistent-authorship checks.
///
/// Injectable so integrations can relax or extend the rules; the engine
/// wires in [`StockLawyer`] by default.
#[async_trait]
pub trait Lawyer: Send + Sync {
    /// A new frame must come from the author of the existing frame.
    async fn validate_dynamic_binding(&self, obj: &DynamicBindingLite) -> PersistResult<()>;

    /// A debinding must come from whoever owns its target.
    async fn validate_debinding(&self, obj: &DebindingLite) -> PersistResult<()>;
}

/// The standard rules, checked against the local index.
pub struct StockLawyer {
    librarian: Arc<dyn Librarian>,
}

impl StockLawyer {
    pub fn new(librarian: Arc<dyn Librarian>) -> Self {
        Self { librarian }
    }
}

#[async_trait]
impl Lawyer for StockLawyer {
    async fn validate_dynamic_binding(&self, obj: &DynamicBindingLite) -> PersistResult<()> {
        match self.librarian.summarize(obj.ghid).await {
            Ok(LiteObject::DynamicBinding(existing)) => {
                if existing.author != obj.author {
                    return Err(PersistError::InconsistentAuthor {
                        object: LiteObject::DynamicBinding(obj.clone()).to_string(),
                        expected: existing.author,
                        actual: obj.author,
                    });
                }
                Ok(())
            }
            // Address collisions are the enforcer's problem.
            Ok(_) => Ok(()),
            Err(PersistError::DoesNotExist(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn validate_debinding(&self, obj: &DebindingLite) -> PersistResult<()> {
        match self.librarian.summarize(obj.target).await {
            Ok(target) => {
                if let Some(expected) = debinding_author_expected(&target) {
                    if expected != obj.author {
                        return Err(PersistError::InconsistentAuthor {
                            object: LiteObject::Debinding(obj.clone()).to_string(),
                            expected,
                            actual: obj.author,
                        });
                    }
                }
                Ok(())
            }
            Err(PersistError::DoesNotExist(_)) => {
                debug!(debinding = %obj.ghid, target = %obj.target, "debinding target unknown, authorship unchecked");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// Accepts everything. Test double.
pub struct PermissiveLawyer;

#[async_trait]
impl Lawyer for PermissiveLawyer {
    async fn validate_dynamic_binding(&self, _obj: &DynamicBindingLite) -> PersistResult<()> {
        Ok(())
    }

    async fn validate_debinding(&self, _obj: &DebindingLite) -> PersistResult<()> {
        Ok(())
    }
}
