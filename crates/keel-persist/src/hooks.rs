use async_trait::async_trait;
use keel_types::{
    ConnId, ContainerLite, DebindingLite, DynamicBindingLite, Ghid, IdentityLite, LiteObject,
    RequestLite, StaticBindingLite,
};

/// Garbage-collection observer, alerted just before the librarian write.
///
/// Every method defaults to a no-op; implementations override only the
/// kinds they care about. The usual job is collecting objects orphaned by a
/// debinding or a superseded frame. `skip_conn` identifies the connection
/// the object arrived on, so downstream notifications can avoid echoing.
#[async_trait]
pub trait Undertaker: Send + Sync {
    async fn alert_identity(&self, _obj: &IdentityLite, _skip_conn: Option<ConnId>) {}
    async fn alert_container(&self, _obj: &ContainerLite, _skip_conn: Option<ConnId>) {}
    async fn alert_static_binding(&self, _obj: &StaticBindingLite, _skip_conn: Option<ConnId>) {}
    async fn alert_dynamic_binding(&self, _obj: &DynamicBindingLite, _skip_conn: Option<ConnId>) {}
    async fn alert_debinding(&self, _obj: &DebindingLite, _skip_conn: Option<ConnId>) {}
    async fn alert_request(&self, _obj: &RequestLite, _skip_conn: Option<ConnId>) {}
}

/// Subscription-notification scheduler.
///
/// Only genuinely new objects are scheduled, and only through the full
/// ingest path; duplicates and direct ingests never notify.
#[async_trait]
pub trait Postman: Send + Sync {
    async fn schedule(&self, obj: &LiteObject, skip_conn: Option<ConnId>);
}

/// Upstream propagation hook, fed every new remotable object.
#[async_trait]
pub trait Salmonator: Send + Sync {
    async fn push(&self, ghid: Ghid);
}

/// Inert implementation of all three hooks.
pub struct NoOpHooks;

#[async_trait]
impl Undertaker for NoOpHooks {}

#[async_trait]
impl Postman for NoOpHooks {
    async fn schedule(&self, _obj: &LiteObject, _skip_conn: Option<ConnId>) {}
}

#[async_trait]
impl Salmonator for NoOpHooks {
    async fn push(&self, _ghid: Ghid) {}
}
