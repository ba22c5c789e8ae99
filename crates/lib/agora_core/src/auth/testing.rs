//! Shared fixture for auth tests: in-memory stores with default roles seeded.

use std::sync::Arc;

use super::jwt::TokenKeys;
use super::revocation::RevocationStore;
use super::roles::{DefaultRoles, seed_default_roles};
use super::service::AuthService;
use crate::cache::MemoryCache;
use crate::store::MemoryStore;

pub(crate) const TEST_SECRET: &[u8] = b"test-secret-key-for-unit-tests";

pub(crate) struct Fixture {
    pub service: AuthService,
    pub store: MemoryStore,
    pub cache: MemoryCache,
    pub roles: DefaultRoles,
}

pub(crate) async fn fixture() -> Fixture {
    let store = MemoryStore::new();
    let cache = MemoryCache::new();
    let service = AuthService::from_store(
        store.clone(),
        RevocationStore::new(Arc::new(cache.clone())),
        TokenKeys::new(TEST_SECRET),
    );
    let roles = seed_default_roles(&service).await.unwrap();
    Fixture {
        service,
        store,
        cache,
        roles,
    }
}
