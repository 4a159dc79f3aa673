//! Authoritative entity list with a single-lease traversal cursor.

use std::{
    ops::Deref,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use rand::{seq::SliceRandom, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rat_game_core::{EntityId, RegistryError};
use tracing::{debug, warn};

use crate::entity::EntityHandle;

const DEFAULT_SHUFFLE_SEED: u64 = 0x5eed_7a75_0f0a_11ed;

/// Owns every entity and hands out at most one traversal cursor at a time.
///
/// The registry is Idle until [`EntityRegistry::checkout_cursor`] succeeds and
/// Leased until the same cursor is handed back. While Leased, structural
/// changes are refused with [`RegistryError::ConcurrentAccess`].
#[derive(Debug)]
pub struct EntityRegistry {
    state: Mutex<RegistryState>,
}

#[derive(Debug)]
struct RegistryState {
    entities: Vec<EntityHandle>,
    lease: Option<ActiveLease>,
    rng: ChaCha8Rng,
    issued: u64,
}

#[derive(Debug)]
struct ActiveLease {
    serial: u64,
    snapshot: Arc<[EntityHandle]>,
}

impl EntityRegistry {
    /// Creates an empty registry shuffling with the default seed.
    #[must_use]
    pub fn new() -> Self {
        Self::with_seed(DEFAULT_SHUFFLE_SEED)
    }

    /// Creates an empty registry whose shuffles derive from `seed`.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            state: Mutex::new(RegistryState {
                entities: Vec::new(),
                lease: None,
                rng: ChaCha8Rng::seed_from_u64(seed),
                issued: 0,
            }),
        }
    }

    /// Shuffles the entities and leases a cursor over the new order.
    pub fn checkout_cursor(&self) -> Result<Cursor, RegistryError> {
        let mut state = self.lock();
        if state.lease.is_some() {
            return Err(RegistryError::ConcurrentAccess);
        }
        if state.entities.is_empty() {
            return Err(RegistryError::EmptyRegistry);
        }

        let RegistryState {
            entities,
            lease,
            rng,
            issued,
        } = &mut *state;
        entities.shuffle(rng);
        *issued += 1;
        let snapshot: Arc<[EntityHandle]> = entities.iter().cloned().collect();
        *lease = Some(ActiveLease {
            serial: *issued,
            snapshot: Arc::clone(&snapshot),
        });
        debug!(lease = *issued, entities = snapshot.len(), "cursor checked out");

        Ok(Cursor {
            serial: *issued,
            snapshot,
            position: 0,
        })
    }

    /// Returns a cursor issued by [`EntityRegistry::checkout_cursor`].
    ///
    /// The cursor is exhausted so that it yields nothing afterwards.
    pub fn release_cursor(&self, cursor: &mut Cursor) -> Result<(), RegistryError> {
        let mut state = self.lock();
        let owned = state
            .lease
            .as_ref()
            .map_or(false, |active| Arc::ptr_eq(&active.snapshot, &cursor.snapshot));
        if !owned {
            return Err(RegistryError::OwnershipMismatch);
        }

        cursor.exhaust();
        if let Some(active) = state.lease.take() {
            debug!(lease = active.serial, "cursor released");
        }
        Ok(())
    }

    /// Checks out a cursor wrapped in a guard that releases it when dropped.
    pub fn lease(&self) -> Result<Lease<'_>, RegistryError> {
        let cursor = self.checkout_cursor()?;
        Ok(Lease {
            registry: self,
            cursor,
        })
    }

    /// Appends a new entity. Refused while a cursor is checked out.
    pub fn add_entity(&self, entity: EntityHandle) -> Result<(), RegistryError> {
        let mut state = self.lock();
        if state.lease.is_some() {
            return Err(RegistryError::ConcurrentAccess);
        }
        state.entities.push(entity);
        Ok(())
    }

    /// Drops the listed entities, returning how many were removed.
    /// Refused while a cursor is checked out.
    pub fn remove_entities(&self, ids: &[EntityId]) -> Result<usize, RegistryError> {
        let mut state = self.lock();
        if state.lease.is_some() {
            return Err(RegistryError::ConcurrentAccess);
        }
        let before = state.entities.len();
        state.entities.retain(|entity| !ids.contains(&entity.id()));
        Ok(before - state.entities.len())
    }

    /// Number of registered entities.
    #[must_use]
    pub fn size(&self) -> usize {
        self.lock().entities.len()
    }

    /// Reports whether a cursor is currently checked out.
    #[must_use]
    pub fn has_active_cursor(&self) -> bool {
        self.lock().lease.is_some()
    }

    /// Reports whether the entity is registered.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.lock().entities.iter().any(|entity| entity.id() == id)
    }

    /// Copy of the registered handles in their current order.
    #[must_use]
    pub fn entities(&self) -> Vec<EntityHandle> {
        self.lock().entities.clone()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Single-use forward cursor over the entity order fixed at checkout.
#[derive(Debug)]
pub struct Cursor {
    serial: u64,
    snapshot: Arc<[EntityHandle]>,
    position: usize,
}

impl Cursor {
    /// Sequence number of the lease the cursor belongs to.
    #[must_use]
    pub const fn lease_serial(&self) -> u64 {
        self.serial
    }

    /// Number of entities captured at checkout.
    #[must_use]
    pub fn total(&self) -> usize {
        self.snapshot.len()
    }

    /// Number of entities not yet visited.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.snapshot.len().saturating_sub(self.position)
    }

    /// Reports whether every entity has been visited.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    fn exhaust(&mut self) {
        self.position = self.snapshot.len();
    }
}

impl Iterator for Cursor {
    type Item = EntityHandle;

    fn next(&mut self) -> Option<Self::Item> {
        let entity = self.snapshot.get(self.position).cloned()?;
        self.position += 1;
        Some(entity)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining();
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Cursor {}

/// Checked-out cursor that returns itself to the registry on drop.
#[derive(Debug)]
pub struct Lease<'registry> {
    registry: &'registry EntityRegistry,
    cursor: Cursor,
}

impl Iterator for Lease<'_> {
    type Item = EntityHandle;

    fn next(&mut self) -> Option<Self::Item> {
        self.cursor.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.cursor.size_hint()
    }
}

impl Deref for Lease<'_> {
    type Target = Cursor;

    fn deref(&self) -> &Self::Target {
        &self.cursor
    }
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        if let Err(error) = self.registry.release_cursor(&mut self.cursor) {
            warn!(%error, lease = self.cursor.serial, "lease guard failed to release cursor");
        }
    }
}
