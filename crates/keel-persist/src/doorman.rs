use std::sync::Arc;

use keel_crypto::VerifyingKey;
use keel_primitives::{parse, Parsed};
use keel_types::LiteObject;
use tokio::task;
use tracing::debug;

use crate::error::{PersistError, PersistResult};
use crate::librarian::Librarian;

/// Parses and authenticates inbound primitives.
///
/// Parsing is a pure function over the input bytes, so any number of loads
/// may run concurrently. Parse and signature verification both run on the
/// blocking pool; bodies can reach the megabyte range.
pub struct Doorman {
    librarian: Arc<dyn Librarian>,
}

impl Doorman {
    pub fn new(librarian: Arc<dyn Librarian>) -> Self {
        Self { librarian }
    }

    /// Load packed bytes into a lite object, verifying authorship.
    ///
    /// Identity records skip verification (they are the trust anchor) and
    /// requests cannot be verified by a store-and-forward node. Everything
    /// else must carry a signature that checks out against an author
    /// already on record.
    pub async fn load(&self, packed: &[u8]) -> PersistResult<LiteObject> {
        let owned = packed.to_vec();
        let parsed = run_blocking(move || parse(&owned)).await?;
        let parsed =
            parsed.map_err(|e| PersistError::MalformedPrimitive(e.to_string()))?;

        let Some(author) = parsed.author_ghid() else {
            debug!(obj = %parsed.lite(), "loaded unsigned primitive");
            return Ok(parsed.into_lite());
        };

        let summary = match self.librarian.summarize(author).await {
            Ok(summary) => summary,
            Err(PersistError::DoesNotExist(_)) => {
                return Err(PersistError::InvalidIdentity(author));
            }
            Err(e) => return Err(e),
        };
        let LiteObject::Identity(identity) = summary else {
            return Err(PersistError::InvalidIdentity(author));
        };
        let key = VerifyingKey::from_bytes(identity.public_key)
            .map_err(|_| PersistError::InvalidIdentity(author))?;

        let parsed: Parsed = run_blocking(move || {
            parsed
                .verify(&key)
                .map_err(|e| PersistError::VerificationFailure(e.to_string()))?;
            Ok::<_, PersistError>(parsed)
        })
        .await??;

        debug!(obj = %parsed.lite(), "loaded and verified primitive");
        Ok(parsed.into_lite())
    }
}

async fn run_blocking<T, F>(f: F) -> PersistResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    task::spawn_blocking(f)
        .await
        .map_err(|e| PersistError::Internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::librarian::MemoryLibrarian;
    use keel_primitives::{seal_request, FirstParty};
    use keel_types::Ghid;

    async fn setup() -> (Arc<MemoryLibrarian>, Doorman, FirstParty) {
        let librarian = MemoryLibrarian::shared();
        let doorman = Doorman::new(librarian.clone());
        let party = FirstParty::generate();
        librarian
            .store(
                &LiteObject::Identity(party.identity_lite()),
                party.identity_packed(),
            )
            .await
            .unwrap();
        (librarian, doorman, party)
    }

    #[tokio::test]
    async fn garbage_is_malformed() {
        let (_librarian, doorman, _party) = setup().await;
        let err = doorman.load(b"not a primitive").await.unwrap_err();
        assert!(matches!(err, PersistError::MalformedPrimitive(_)));
    }

    #[tokio::test]
    async fn signed_primitive_loads_with_known_author() {
        let (_librarian, doorman, party) = setup().await;
        let sealed = party.seal_container(b"payload");
        let loaded = doorman.load(&sealed.packed).await.unwrap();
        assert_eq!(loaded, sealed.lite);
    }

    #[tokio::test]
    async fn unknown_author_is_invalid_identity() {
        let (_librarian, doorman, _party) = setup().await;
        let stranger = FirstParty::generate();
        let sealed = stranger.seal_container(b"payload");
        let err = doorman.load(&sealed.packed).await.unwrap_err();
        assert!(matches!(err, PersistError::InvalidIdentity(_)));
    }

    #[tokio::test]
    async fn tampered_signature_fails_verification() {
        let (_librarian, doorman, party) = setup().await;
        let mut packed = party.seal_container(b"payload").packed;
        let last = packed.len() - 1;
        packed[last] ^= 0xff;
        let err = doorman.load(&packed).await.unwrap_err();
        assert!(matches!(err, PersistError::VerificationFailure(_)));
    }

    #[tokio::test]
    async fn identity_and_request_skip_verification() {
        let (_librarian, doorman, party) = setup().await;
        doorman.load(party.identity_packed()).await.unwrap();

        let request = seal_request(Ghid::pseudorandom(), b"opaque");
        doorman.load(&request.packed).await.unwrap();
    }

    #[tokio::test]
    async fn non_identity_author_is_invalid() {
        let (librarian, doorman, _party) = setup().await;
        let stranger = FirstParty::generate();
        // Plant a container at the ghid the stranger claims as author.
        let squatter = LiteObject::Container(keel_types::ContainerLite {
            ghid: stranger.ghid(),
            author: Ghid::pseudorandom(),
        });
        librarian.store(&squatter, b"squatter").await.unwrap();

        let sealed = stranger.seal_container(b"payload");
        let err = doorman.load(&sealed.packed).await.unwrap_err();
        assert!(matches!(err, PersistError::InvalidIdentity(_)));
    }
}
