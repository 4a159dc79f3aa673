#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Deferred spawning for entities requested while a tick is in progress.
//!
//! Event-driven code (item use, scripted waves) may ask for new entities from
//! any thread. The registry refuses structural changes while a cursor is
//! leased, so requests wait in a [`SpawnQueue`] until the tick driver flushes
//! them between ticks.

use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard, PoisonError},
};

use rat_game_core::{CellCoord, EntityId, MapError, RegistryError};
use rat_game_world::{ContextualMap, EntityHandle, EntityRegistry};
use thiserror::Error;
use tracing::{debug, warn};

/// A fully constructed entity waiting to join the simulation.
#[derive(Clone, Debug)]
pub struct SpawnRequest {
    entity: EntityHandle,
    extra_cells: Vec<CellCoord>,
}

impl SpawnRequest {
    /// Requests a single-tile entity placed at its current position.
    #[must_use]
    pub fn new(entity: EntityHandle) -> Self {
        Self {
            entity,
            extra_cells: Vec::new(),
        }
    }

    /// Requests an entity that additionally covers `extra_cells`.
    #[must_use]
    pub fn covering(entity: EntityHandle, extra_cells: Vec<CellCoord>) -> Self {
        Self {
            entity,
            extra_cells,
        }
    }

    /// Entity to be spawned.
    #[must_use]
    pub fn entity(&self) -> &EntityHandle {
        &self.entity
    }

    /// Cells occupied in addition to the entity's origin.
    #[must_use]
    pub fn extra_cells(&self) -> &[CellCoord] {
        &self.extra_cells
    }

    fn validate(&self, map: &ContextualMap) -> Result<(), MapError> {
        if map.contains(self.entity.id()) {
            return Err(MapError::AlreadyPlaced(self.entity.id()));
        }
        let origin = self.entity.position();
        std::iter::once(&origin)
            .chain(self.extra_cells.iter())
            .find(|cell| !map.in_bounds(**cell))
            .map_or(Ok(()), |cell| Err(MapError::out_of_bounds(*cell)))
    }
}

/// Failures reported while flushing the queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum SpawnError {
    /// The registry refused the new entity; the request stays queued.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Outcome of a successful flush.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SpawnReport {
    /// Entities that joined the registry and the map, in request order.
    pub spawned: Vec<EntityId>,
    /// Requests dropped because the map rejected their placement.
    pub rejected: Vec<(EntityId, MapError)>,
}

/// Thread-safe FIFO of pending spawn requests.
#[derive(Debug, Default)]
pub struct SpawnQueue {
    state: Mutex<QueueState>,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<SpawnRequest>,
    /// Results of a flush interrupted by a lease, reported by the next flush.
    carried: SpawnReport,
}

impl SpawnQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a request. Safe to call from any thread at any time.
    pub fn request(&self, request: SpawnRequest) {
        debug!(entity = %request.entity.id(), kind = ?request.entity.kind(), "spawn requested");
        self.lock().pending.push_back(request);
    }

    /// Number of queued requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    /// Reports whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().pending.is_empty()
    }

    /// Applies every queued request in arrival order.
    ///
    /// Each entity joins the registry first and the map second, so a tick
    /// that starts in between simply finds it not yet placed. If the registry
    /// is leased the remaining requests stay queued and the error is returned;
    /// whatever was applied before the refusal is reported by the next
    /// successful flush.
    pub fn flush(
        &self,
        registry: &EntityRegistry,
        map: &ContextualMap,
    ) -> Result<SpawnReport, SpawnError> {
        let mut report = std::mem::take(&mut self.lock().carried);
        loop {
            let Some(request) = self.lock().pending.pop_front() else {
                break;
            };
            let id = request.entity.id();

            if let Err(error) = request.validate(map) {
                warn!(entity = %id, %error, "dropping spawn request");
                report.rejected.push((id, error));
                continue;
            }

            match admit(&request, registry, map) {
                Ok(Ok(())) => report.spawned.push(id),
                Ok(Err(error)) => report.rejected.push((id, error)),
                Err(error) => {
                    let mut state = self.lock();
                    state.pending.push_front(request);
                    state.carried = report;
                    return Err(error.into());
                }
            }
        }

        if !report.spawned.is_empty() {
            debug!(spawned = report.spawned.len(), "flushed spawn queue");
        }
        Ok(report)
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Registers the entity, then places it. A failed placement withdraws the
/// registration so the entity is never registered without being on the map.
fn admit(
    request: &SpawnRequest,
    registry: &EntityRegistry,
    map: &ContextualMap,
) -> Result<Result<(), MapError>, RegistryError> {
    let id = request.entity.id();
    registry.add_entity(request.entity.clone())?;
    if let Err(error) = map.restore(&request.entity, &request.extra_cells) {
        warn!(entity = %id, %error, "spawned entity could not be placed");
        if let Err(withdraw) = registry.remove_entities(&[id]) {
            warn!(entity = %id, error = %withdraw, "could not withdraw unplaced entity");
        }
        return Ok(Err(error));
    }
    Ok(Ok(()))
}
