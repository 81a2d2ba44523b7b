use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use keel_types::{Ghid, LiteObject};
use tracing::error;

use crate::enforcer::debinding_target_is_legal;
use crate::error::{PersistError, PersistResult};
use crate::lawyer::debinding_author_expected;

/// The object index and raw-bytes store.
///
/// The librarian is the sole source of truth for what exists locally. All
/// lookups key on the reference ghid: the frame ghid for dynamic bindings,
/// the primary ghid for everything else. Callers may pass a dynamic
/// binding's stable address anywhere a ghid is accepted; it resolves to the
/// current frame.
#[async_trait]
pub trait Librarian: Send + Sync {
    /// Whether the ghid resolves to a stored object.
    async fn contains(&self, ghid: Ghid) -> PersistResult<bool>;

    /// Start tracking an object. `packed` is its canonical wire form.
    async fn store(&self, obj: &LiteObject, packed: &[u8]) -> PersistResult<()>;

    /// The stored raw bytes for a ghid.
    async fn retrieve(&self, ghid: Ghid) -> PersistResult<Vec<u8>>;

    /// The stored lite view for a ghid.
    async fn summarize(&self, ghid: Ghid) -> PersistResult<LiteObject>;

    /// Whether anything currently binds the object's ghid.
    async fn is_bound(&self, obj: &LiteObject) -> PersistResult<bool>;

    /// Whether any surviving debinding targets the object's ghid.
    ///
    /// Debindings are accepted on trust when their target is unknown, so
    /// this revalidates each recorded debinding against `obj` and drops the
    /// ones the now-known target proves illegal.
    async fn is_debound(&self, obj: &LiteObject) -> PersistResult<bool>;
}

#[derive(Default)]
struct Inner {
    /// Reference ghid to raw packed bytes.
    shelf: HashMap<Ghid, Vec<u8>>,
    /// Reference ghid to lite view.
    catalog: HashMap<Ghid, LiteObject>,
    /// Stable dynamic address to current frame ghid.
    dyn_resolver: HashMap<Ghid, Ghid>,
    /// Target ghid to the ghids of bindings holding it.
    bound_by: HashMap<Ghid, HashSet<Ghid>>,
    /// Target ghid to the ghids of debindings against it.
    debound_by: HashMap<Ghid, HashSet<Ghid>>,
    /// Recipient ghid to the ghids of requests addressed to it.
    requests_for: HashMap<Ghid, HashSet<Ghid>>,
}

fn resolve(inner: &Inner, ghid: Ghid) -> Ghid {
    inner.dyn_resolver.get(&ghid).copied().unwrap_or(ghid)
}

fn remove_from_set(map: &mut HashMap<Ghid, HashSet<Ghid>>, key: Ghid, value: Ghid) {
    if let Some(set) = map.get_mut(&key) {
        set.remove(&value);
        if set.is_empty() {
            map.remove(&key);
        }
    }
}

fn store_locked(inner: &mut Inner, obj: &LiteObject, packed: &[u8]) {
    match obj {
        LiteObject::DynamicBinding(frame) => {
            // A newer frame supersedes the old one entirely.
            if let Some(old_frame) = inner.dyn_resolver.get(&frame.ghid).copied() {
                if let Some(LiteObject::DynamicBinding(old)) = inner.catalog.get(&old_frame) {
                    let old_target = old.target();
                    remove_from_set(&mut inner.bound_by, old_target, frame.ghid);
                }
                inner.shelf.remove(&old_frame);
                inner.catalog.remove(&old_frame);
            }
            inner.dyn_resolver.insert(frame.ghid, frame.frame_ghid);
            inner
                .bound_by
                .entry(frame.target())
                .or_default()
                .insert(frame.ghid);
        }
        LiteObject::StaticBinding(binding) => {
            inner
                .bound_by
                .entry(binding.target)
                .or_default()
                .insert(binding.ghid);
        }
        LiteObject::Debinding(debinding) => {
            inner
                .debound_by
                .entry(debinding.target)
                .or_default()
                .insert(debinding.ghid);
        }
        LiteObject::Request(request) => {
            inner
                .requests_for
                .entry(request.recipient)
                .or_default()
                .insert(request.ghid);
        }
        LiteObject::Identity(_) | LiteObject::Container(_) => {}
    }
    inner.shelf.insert(obj.dedup_ghid(), packed.to_vec());
    inner.catalog.insert(obj.dedup_ghid(), obj.clone());
}

fn abandon_locked(inner: &mut Inner, obj: &LiteObject) {
    let reference = obj.dedup_ghid();
    inner.shelf.remove(&reference);
    inner.catalog.remove(&reference);
    match obj {
        LiteObject::DynamicBinding(frame) => {
            if inner.dyn_resolver.get(&frame.ghid) == Some(&frame.frame_ghid) {
                inner.dyn_resolver.remove(&frame.ghid);
            }
            remove_from_set(&mut inner.bound_by, frame.target(), frame.ghid);
        }
        LiteObject::StaticBinding(binding) => {
            remove_from_set(&mut inner.bound_by, binding.target, binding.ghid);
        }
        LiteObject::Debinding(debinding) => {
            remove_from_set(&mut inner.debound_by, debinding.target, debinding.ghid);
        }
        LiteObject::Request(request) => {
            remove_from_set(&mut inner.requests_for, request.recipient, request.ghid);
        }
        LiteObject::Identity(_) | LiteObject::Container(_) => {}
    }
}

/// In-memory [`Librarian`] backed by explicit strong-owned maps.
#[derive(Default)]
pub struct MemoryLibrarian {
    inner: RwLock<Inner>,
}

impl MemoryLibrarian {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arc-wrapped constructor for wiring into the engine.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Stop tracking an object and unwind its index entries.
    pub fn abandon(&self, obj: &LiteObject) {
        let mut inner = self.inner.write().expect("lock poisoned");
        abandon_locked(&mut inner, obj);
    }

    /// The ghids of every stored request addressed to `recipient`.
    pub fn requests_for(&self, recipient: Ghid) -> Vec<Ghid> {
        let inner = self.inner.read().expect("lock poisoned");
        inner
            .requests_for
            .get(&recipient)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// The ghids of every binding holding `target`.
    pub fn bind_status(&self, target: Ghid) -> Vec<Ghid> {
        let inner = self.inner.read().expect("lock poisoned");
        inner
            .bound_by
            .get(&target)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Librarian for MemoryLibrarian {
    async fn contains(&self, ghid: Ghid) -> PersistResult<bool> {
        let inner = self.inner.read().expect("lock poisoned");
        let reference = resolve(&inner, ghid);
        Ok(inner.shelf.contains_key(&reference))
    }

    async fn store(&self, obj: &LiteObject, packed: &[u8]) -> PersistResult<()> {
        let mut inner = self.inner.write().expect("lock poisoned");
        store_locked(&mut inner, obj, packed);
        Ok(())
    }

    async fn retrieve(&self, ghid: Ghid) -> PersistResult<Vec<u8>> {
        let inner = self.inner.read().expect("lock poisoned");
        let reference = resolve(&inner, ghid);
        inner
            .shelf
            .get(&reference)
            .cloned()
            .ok_or(PersistError::DoesNotExist(ghid))
    }

    async fn summarize(&self, ghid: Ghid) -> PersistResult<LiteObject> {
        let inner = self.inner.read().expect("lock poisoned");
        let reference = resolve(&inner, ghid);
        inner
            .catalog
            .get(&reference)
            .cloned()
            .ok_or(PersistError::DoesNotExist(ghid))
    }

    async fn is_bound(&self, obj: &LiteObject) -> PersistResult<bool> {
        let inner = self.inner.read().expect("lock poisoned");
        Ok(inner
            .bound_by
            .get(&obj.ghid())
            .is_some_and(|set| !set.is_empty()))
    }

    async fn is_debound(&self, obj: &LiteObject) -> PersistResult<bool> {
        let mut inner = self.inner.write().expect("lock poisoned");
        let debindings: Vec<Ghid> = inner
            .debound_by
            .get(&obj.ghid())
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();

        let mut surviving = 0usize;
        for debinding_ghid in debindings {
            let recorded = inner.catalog.get(&debinding_ghid).cloned();
            let Some(LiteObject::Debinding(debinding)) = recorded else {
                remove_from_set(&mut inner.debound_by, obj.ghid(), debinding_ghid);
                continue;
            };
            let legal = debinding_target_is_legal(obj.kind())
                && debinding_author_expected(obj) == Some(debinding.author);
            if legal {
                surviving += 1;
            } else {
                error!(
                    debinding = %debinding_ghid,
                    target = %obj,
                    "dropping debinding invalidated by its now-known target"
                );
                abandon_locked(&mut inner, &LiteObject::Debinding(debinding));
            }
        }
        Ok(surviving > 0)
    }
}
