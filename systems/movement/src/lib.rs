#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Per-entity movement policy that proposes wandering steps without
//! committing them.
//!
//! A [`MovementHandler`] is bound to one entity and reused every tick. Each
//! call to [`MovementHandler::evaluate`] inspects the entity's neighbours on a
//! [`ContextualMap`], filters them through the tile blacklist, avoids stepping
//! straight back unless cornered, and reports which blacklisted entities (if
//! any) stand on the chosen destination. Committing the move is left to the
//! caller.

use std::collections::BTreeSet;

use rand::{seq::SliceRandom, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rat_game_core::{CellCoord, Direction, EntityKind, MapError, MovementError, TileKind};
use rat_game_world::{ContextualMap, EntityHandle, OccupancyNode};
use tracing::trace;

/// Movement policy bound to a single entity.
#[derive(Debug)]
pub struct MovementHandler {
    entity: EntityHandle,
    tile_blacklist: BTreeSet<TileKind>,
    entity_blacklist: BTreeSet<EntityKind>,
    order: Vec<Direction>,
    verbose: bool,
    previous: Option<CellCoord>,
    rng: ChaCha8Rng,
}

impl MovementHandler {
    /// Creates a handler with empty blacklists and the default direction order.
    #[must_use]
    pub fn new(entity: EntityHandle, seed: u64) -> Self {
        Self::with_rng(entity, ChaCha8Rng::seed_from_u64(seed))
    }

    /// Creates a handler drawing tie-breaks from the provided random source.
    #[must_use]
    pub fn with_rng(entity: EntityHandle, rng: ChaCha8Rng) -> Self {
        Self {
            entity,
            tile_blacklist: BTreeSet::new(),
            entity_blacklist: BTreeSet::new(),
            order: Direction::DEFAULT_EVALUATION_ORDER.to_vec(),
            verbose: false,
            previous: None,
            rng,
        }
    }

    /// Builder-style variant of [`MovementHandler::set_tile_blacklist`].
    #[must_use]
    pub fn with_tile_blacklist<I>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = TileKind>,
    {
        self.set_tile_blacklist(kinds);
        self
    }

    /// Builder-style variant of [`MovementHandler::set_entity_blacklist`].
    #[must_use]
    pub fn with_entity_blacklist<I>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = EntityKind>,
    {
        self.set_entity_blacklist(kinds);
        self
    }

    /// Builder-style variant of [`MovementHandler::set_direction_order`].
    pub fn with_direction_order<I>(mut self, order: I) -> Result<Self, MovementError>
    where
        I: IntoIterator<Item = Direction>,
    {
        self.set_direction_order(order)?;
        Ok(self)
    }

    /// Builder-style variant of [`MovementHandler::set_verbose`].
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.set_verbose(verbose);
        self
    }

    /// Replaces the set of tile kinds the entity refuses to enter.
    pub fn set_tile_blacklist<I>(&mut self, kinds: I)
    where
        I: IntoIterator<Item = TileKind>,
    {
        self.tile_blacklist = kinds.into_iter().collect();
    }

    /// Replaces the set of entity kinds that block a destination.
    pub fn set_entity_blacklist<I>(&mut self, kinds: I)
    where
        I: IntoIterator<Item = EntityKind>,
    {
        self.entity_blacklist = kinds.into_iter().collect();
    }

    /// Replaces the order in which neighbours are evaluated.
    ///
    /// Repeated directions are kept once. The remembered previous position is
    /// not affected.
    pub fn set_direction_order<I>(&mut self, order: I) -> Result<(), MovementError>
    where
        I: IntoIterator<Item = Direction>,
    {
        let mut deduplicated = Vec::with_capacity(Direction::ALL.len());
        for direction in order {
            if !deduplicated.contains(&direction) {
                deduplicated.push(direction);
            }
        }
        if deduplicated.is_empty() {
            return Err(MovementError::Misconfiguration(
                "direction evaluation order must not be empty",
            ));
        }
        self.order = deduplicated;
        Ok(())
    }

    /// Chooses between reporting the first blocker or every blocker.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Entity the handler moves.
    #[must_use]
    pub fn entity(&self) -> &EntityHandle {
        &self.entity
    }

    /// Tile kinds the entity refuses to enter.
    #[must_use]
    pub fn tile_blacklist(&self) -> &BTreeSet<TileKind> {
        &self.tile_blacklist
    }

    /// Entity kinds that block a destination.
    #[must_use]
    pub fn entity_blacklist(&self) -> &BTreeSet<EntityKind> {
        &self.entity_blacklist
    }

    /// Order in which neighbours are evaluated.
    #[must_use]
    pub fn direction_order(&self) -> &[Direction] {
        &self.order
    }

    /// Reports whether every blocker is collected.
    #[must_use]
    pub const fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Origin of the most recent evaluation that chose a destination.
    #[must_use]
    pub const fn previous_position(&self) -> Option<CellCoord> {
        self.previous
    }

    /// Clears the remembered position so the next evaluation behaves like the first.
    pub fn forget_previous_position(&mut self) {
        self.previous = None;
    }

    /// Proposes the entity's next step on `map` without mutating the map.
    ///
    /// The origin is remembered as the previous position whenever a
    /// destination is chosen, even if the proposal turns out blocked.
    pub fn evaluate<'map>(
        &mut self,
        map: &'map ContextualMap,
    ) -> Result<MoveOutcome<'map>, MovementError> {
        if !map.contains(self.entity.id()) {
            return Err(MapError::NotPresent(self.entity.id()).into());
        }

        let origin = map.origin_of(&self.entity)?;
        let candidates = self.candidates(map, origin)?;
        let Some(destination) = self.choose(&candidates) else {
            trace!(entity = %self.entity.id(), cell = %origin.cell(), "no move possible");
            return Ok(MoveOutcome::Stay);
        };

        let blocking = self.blockers(destination);
        self.previous = Some(origin.cell());
        trace!(
            entity = %self.entity.id(),
            from = %origin.cell(),
            to = %destination.cell(),
            blockers = blocking.len(),
            "evaluated move"
        );

        Ok(MoveOutcome::Proposed(MoveProposal {
            from: origin,
            to: destination,
            blocking,
        }))
    }

    /// Commits an unblocked proposal, returning whether the entity moved.
    pub fn commit(
        &self,
        map: &ContextualMap,
        proposal: &MoveProposal<'_>,
    ) -> Result<bool, MapError> {
        if proposal.is_blocked() {
            return Ok(false);
        }
        map.move_to(&self.entity, proposal.to())?;
        Ok(true)
    }

    fn candidates<'map>(
        &self,
        map: &'map ContextualMap,
        origin: &'map OccupancyNode,
    ) -> Result<Vec<&'map OccupancyNode>, MapError> {
        let mut candidates = Vec::with_capacity(self.order.len());
        for &direction in &self.order {
            if !map.can_traverse(direction, origin) {
                continue;
            }
            let neighbour = map.traverse(direction, origin)?;
            if self.tile_blacklist.contains(&neighbour.tile().kind()) {
                continue;
            }
            candidates.push(neighbour);
        }
        Ok(candidates)
    }

    fn choose<'map>(
        &mut self,
        candidates: &[&'map OccupancyNode],
    ) -> Option<&'map OccupancyNode> {
        let Some(previous) = self.previous else {
            return candidates.first().copied();
        };

        let onward: Vec<&OccupancyNode> = candidates
            .iter()
            .copied()
            .filter(|node| node.cell() != previous)
            .collect();
        if let Some(choice) = onward.choose(&mut self.rng) {
            return Some(*choice);
        }

        candidates
            .iter()
            .copied()
            .find(|node| node.cell() == previous)
    }

    fn blockers(&self, destination: &OccupancyNode) -> Vec<EntityHandle> {
        let mut blocking = destination.occupants().into_iter().filter(|occupant| {
            occupant.id() != self.entity.id() && self.entity_blacklist.contains(&occupant.kind())
        });

        if self.verbose {
            blocking.collect()
        } else {
            blocking.next().into_iter().collect()
        }
    }
}

/// Result of a single evaluation.
#[derive(Clone, Debug)]
pub enum MoveOutcome<'map> {
    /// No legal destination exists this tick.
    Stay,
    /// A destination was chosen; it may still be blocked.
    Proposed(MoveProposal<'map>),
}

impl<'map> MoveOutcome<'map> {
    /// Proposal carried by the outcome, if a destination was chosen.
    #[must_use]
    pub fn proposal(&self) -> Option<&MoveProposal<'map>> {
        match self {
            Self::Stay => None,
            Self::Proposed(proposal) => Some(proposal),
        }
    }

    /// Cell chosen as destination, if any.
    #[must_use]
    pub fn destination(&self) -> Option<CellCoord> {
        self.proposal().map(|proposal| proposal.to().cell())
    }
}

/// Candidate step from one node to a neighbour.
#[derive(Clone, Debug)]
pub struct MoveProposal<'map> {
    from: &'map OccupancyNode,
    to: &'map OccupancyNode,
    blocking: Vec<EntityHandle>,
}

impl<'map> MoveProposal<'map> {
    /// Node the entity would leave.
    #[must_use]
    pub const fn from(&self) -> &'map OccupancyNode {
        self.from
    }

    /// Node the entity would enter.
    #[must_use]
    pub const fn to(&self) -> &'map OccupancyNode {
        self.to
    }

    /// Direction of the step.
    #[must_use]
    pub fn direction(&self) -> Option<Direction> {
        Direction::between(self.from.cell(), self.to.cell())
    }

    /// Reports whether a blacklisted entity stands on the destination.
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        !self.blocking.is_empty()
    }

    /// Blacklisted occupants of the destination; at most one unless verbose.
    #[must_use]
    pub fn blocking(&self) -> &[EntityHandle] {
        &self.blocking
    }
}
