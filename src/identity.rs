//! Session and identifier abstractions.
//!
//! Every store operation asks a [`SessionProvider`] for the acting user and
//! mints record ids through an [`IdGenerator`]. Both are injected so tests
//! can switch users and get deterministic ids.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use crate::model::UserId;

/// Source of the authenticated user for the current call.
pub trait SessionProvider: Send + Sync {
    /// The signed-in user, or `None` when there is no valid session.
    fn current_user(&self) -> Option<UserId>;
}

/// Session fixed at construction time.
#[derive(Debug, Clone, Default)]
pub struct StaticSession {
    user: Option<UserId>,
}

impl StaticSession {
    #[must_use]
    pub fn signed_in(user: impl Into<UserId>) -> Self {
        Self {
            user: Some(user.into()),
        }
    }

    #[must_use]
    pub fn anonymous() -> Self {
        Self { user: None }
    }
}

impl SessionProvider for StaticSession {
    fn current_user(&self) -> Option<UserId> {
        self.user.clone()
    }
}

/// Session whose user can change at runtime. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct SwitchableSession {
    user: Arc<RwLock<Option<UserId>>>,
}

impl SwitchableSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sign_in(&self, user: impl Into<UserId>) {
        if let Ok(mut slot) = self.user.write() {
            *slot = Some(user.into());
        }
    }

    pub fn sign_out(&self) {
        if let Ok(mut slot) = self.user.write() {
            *slot = None;
        }
    }
}

impl SessionProvider for SwitchableSession {
    fn current_user(&self) -> Option<UserId> {
        self.user.read().ok().and_then(|slot| slot.clone())
    }
}

/// Mints identifiers for new rows.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> Uuid;
}

/// Random v4 UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> Uuid {
        Uuid::new_v4()
    }
}

/// Deterministic ids `1, 2, 3, ...` as UUIDs. The counter is per generator.
#[derive(Debug, Default)]
pub struct SequentialIdGenerator {
    next: AtomicU64,
}

impl SequentialIdGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start counting after `last`.
    #[must_use]
    pub fn starting_after(last: u64) -> Self {
        Self {
            next: AtomicU64::new(last),
        }
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&self) -> Uuid {
        let n = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        Uuid::from_u128(u128::from(n))
    }
}
