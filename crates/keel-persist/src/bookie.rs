use std::sync::Arc;

use keel_types::{
    ContainerLite, DebindingLite, DynamicBindingLite, LiteObject, RequestLite, StaticBindingLite,
};

use crate::error::{PersistError, PersistResult};
use crate::librarian::Librarian;

/// Lifetime accounting. Only bind/debind status matters here; authorship
/// and target legality live with the lawyer and enforcer.
pub struct Bookie {
    librarian: Arc<dyn Librarian>,
}

impl Bookie {
    pub fn new(librarian: Arc<dyn Librarian>) -> Self {
        Self { librarian }
    }

    /// Containers only persist under a binding.
    pub async fn validate_container(&self, obj: &ContainerLite) -> PersistResult<()> {
        let lite = LiteObject::Container(obj.clone());
        if !self.librarian.is_bound(&lite).await? {
            return Err(PersistError::UnboundContainer(obj.ghid));
        }
        Ok(())
    }

    pub async fn validate_static_binding(&self, obj: &StaticBindingLite) -> PersistResult<()> {
        let lite = LiteObject::StaticBinding(obj.clone());
        if self.librarian.is_debound(&lite).await? {
            return Err(PersistError::AlreadyDebound(obj.ghid));
        }
        Ok(())
    }

    /// A deliberate binding can override a debinding for a dynamic address:
    /// while something still binds the address, new frames stay legal.
    pub async fn validate_dynamic_binding(&self, obj: &DynamicBindingLite) -> PersistResult<()> {
        let lite = LiteObject::DynamicBinding(obj.clone());
        if self.librarian.is_debound(&lite).await? && !self.librarian.is_bound(&lite).await? {
            return Err(PersistError::AlreadyDebound(obj.ghid));
        }
        Ok(())
    }

    pub async fn validate_debinding(&self, obj: &DebindingLite) -> PersistResult<()> {
        let lite = LiteObject::Debinding(obj.clone());
        if self.librarian.is_debound(&lite).await? {
            return Err(PersistError::AlreadyDebound(obj.ghid));
        }
        Ok(())
    }

    pub async fn validate_request(&self, obj: &RequestLite) -> PersistResult<()> {
        let lite = LiteObject::Request(obj.clone());
        if self.librarian.is_debound(&lite).await? {
            return Err(PersistError::AlreadyDebound(obj.ghid));
        }
        Ok(())
    }
}
