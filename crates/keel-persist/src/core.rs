use std::sync::Arc;

use keel_types::{ConnId, LiteObject};
use tracing::{debug, info};

use crate::bookie::Bookie;
use crate::doorman::Doorman;
use crate::enforcer::Enforcer;
use crate::error::PersistResult;
use crate::hooks::{NoOpHooks, Postman, Salmonator, Undertaker};
use crate::keyed_lock::KeyedLock;
use crate::lawyer::{Lawyer, StockLawyer};
use crate::librarian::Librarian;

/// The persistence engine.
///
/// One `ingest` call takes raw bytes all the way to durable, indexed
/// storage or rejects them with a typed error. The stages run in a fixed
/// order: doorman (parse and authenticate), enforcer (target legality),
/// lawyer (authorship consistency), bookie (lifetimes), undertaker alert,
/// librarian write. A failure at any stage commits nothing.
pub struct PersistenceCore {
    doorman: Doorman,
    enforcer: Enforcer,
    lawyer: Arc<dyn Lawyer>,
    bookie: Bookie,
    librarian: Arc<dyn Librarian>,
    undertaker: Arc<dyn Undertaker>,
    postman: Arc<dyn Postman>,
    salmonator: Arc<dyn Salmonator>,
    ingest_locks: KeyedLock,
}

impl PersistenceCore {
    /// Engine with the stock lawyer and inert hooks.
    pub fn new(librarian: Arc<dyn Librarian>) -> Self {
        Self {
            doorman: Doorman::new(librarian.clone()),
            enforcer: Enforcer::new(librarian.clone()),
            lawyer: Arc::new(StockLawyer::new(librarian.clone())),
            bookie: Bookie::new(librarian.clone()),
            librarian,
            undertaker: Arc::new(NoOpHooks),
            postman: Arc::new(NoOpHooks),
            salmonator: Arc::new(NoOpHooks),
            ingest_locks: KeyedLock::new(),
        }
    }

    pub fn with_lawyer(mut self, lawyer: Arc<dyn Lawyer>) -> Self {
        self.lawyer = lawyer;
        self
    }

    pub fn with_undertaker(mut self, undertaker: Arc<dyn Undertaker>) -> Self {
        self.undertaker = undertaker;
        self
    }

    pub fn with_postman(mut self, postman: Arc<dyn Postman>) -> Self {
        self.postman = postman;
        self
    }

    pub fn with_salmonator(mut self, salmonator: Arc<dyn Salmonator>) -> Self {
        self.salmonator = salmonator;
        self
    }

    /// The librarian this engine writes through.
    pub fn librarian(&self) -> &Arc<dyn Librarian> {
        &self.librarian
    }

    /// Ingest raw bytes from anywhere.
    ///
    /// Returns the stored object, or `None` when it was already on record.
    /// New objects are handed to the postman for subscription notification;
    /// `skip_conn` names the source connection so notifications do not echo
    /// back to it.
    pub async fn ingest(
        &self,
        packed: &[u8],
        remotable: bool,
        skip_conn: Option<ConnId>,
    ) -> PersistResult<Option<LiteObject>> {
        let obj = self.doorman.load(packed).await?;
        let ingested = self.direct_ingest(obj, packed, remotable, skip_conn).await?;

        match &ingested {
            Some(obj) => {
                self.postman.schedule(obj, skip_conn).await;
                info!(%obj, "ingested");
            }
            None => debug!("duplicate upload, nothing to do"),
        }
        Ok(ingested)
    }

    /// Ingest an already-loaded object, skipping the doorman.
    ///
    /// This is the entry point for locally-sealed objects and for internal
    /// re-ingestion. New objects are pushed upstream iff `remotable`;
    /// subscription notification stays with [`PersistenceCore::ingest`].
    pub async fn direct_ingest(
        &self,
        obj: LiteObject,
        packed: &[u8],
        remotable: bool,
        skip_conn: Option<ConnId>,
    ) -> PersistResult<Option<LiteObject>> {
        // Serialize on the dedup ghid so concurrent uploads of the same
        // bytes cannot both pass the contains check below.
        let _guard = self.ingest_locks.lock(obj.dedup_ghid()).await;
        if self.librarian.contains(obj.dedup_ghid()).await? {
            return Ok(None);
        }

        match &obj {
            LiteObject::Identity(o) => {
                self.undertaker.alert_identity(o, skip_conn).await;
            }
            LiteObject::Container(o) => {
                self.bookie.validate_container(o).await?;
                self.undertaker.alert_container(o, skip_conn).await;
            }
            LiteObject::StaticBinding(o) => {
                self.enforcer.validate_static_binding(o).await?;
                self.bookie.validate_static_binding(o).await?;
                self.undertaker.alert_static_binding(o, skip_conn).await;
            }
            LiteObject::DynamicBinding(o) => {
                self.enforcer.validate_dynamic_binding(o).await?;
                self.lawyer.validate_dynamic_binding(o).await?;
                self.bookie.validate_dynamic_binding(o).await?;
                self.undertaker.alert_dynamic_binding(o, skip_conn).await;
            }
            LiteObject::Debinding(o) => {
                self.enforcer.validate_debinding(o).await?;
                self.lawyer.validate_debinding(o).await?;
                self.bookie.validate_debinding(o).await?;
                self.undertaker.alert_debinding(o, skip_conn).await;
            }
            LiteObject::Request(o) => {
                self.bookie.validate_request(o).await?;
                self.undertaker.alert_request(o, skip_conn).await;
            }
        }

        self.librarian.store(&obj, packed).await?;
        if remotable {
            self.salmonator.push(obj.ghid()).await;
        }
        Ok(Some(obj))
    }
}
