use std::collections::BTreeSet;

use proptest::prelude::*;
use rat_game_core::{
    CellCoord, Direction, EntityKind, MapError, MovementError, SequentialIds, Tile, TileGrid,
    TileKind,
};
use rat_game_system_movement::{MoveOutcome, MovementHandler};
use rat_game_world::{ContextualMap, Entity, EntityHandle};

fn path_map(rows: u32, columns: u32) -> ContextualMap {
    ContextualMap::new(TileGrid::uniform(rows, columns, TileKind::Path))
}

fn placed(
    map: &ContextualMap,
    ids: &SequentialIds,
    kind: EntityKind,
    cell: CellCoord,
) -> EntityHandle {
    let entity = Entity::spawn(ids, kind, cell, 3);
    map.place(&entity).expect("placed");
    entity
}

#[test]
fn first_move_on_open_grid_heads_north() {
    let ids = SequentialIds::new();
    let map = path_map(3, 3);
    let rat = placed(&map, &ids, EntityKind::Rat, CellCoord::new(1, 1));

    for seed in 0..16 {
        let mut handler = MovementHandler::new(rat.clone(), seed);
        let outcome = handler.evaluate(&map).expect("evaluated");
        assert_eq!(outcome.destination(), Some(CellCoord::new(0, 1)));
    }
}

#[test]
fn dead_end_reverses_onto_previous_cell() {
    let ids = SequentialIds::new();
    let map = path_map(1, 2);
    let rat = placed(&map, &ids, EntityKind::Rat, CellCoord::new(0, 0));
    let mut handler = MovementHandler::new(rat, 4);

    let first = handler.evaluate(&map).expect("evaluated");
    let proposal = first.proposal().expect("first move");
    assert_eq!(proposal.to().cell(), CellCoord::new(0, 1));
    assert_eq!(proposal.direction(), Some(Direction::East));
    assert!(handler.commit(&map, proposal).expect("committed"));

    let second = handler.evaluate(&map).expect("evaluated");
    assert_eq!(second.destination(), Some(CellCoord::new(0, 0)));
}

#[test]
fn first_move_takes_east_before_south() {
    let ids = SequentialIds::new();
    let grid = TileGrid::uniform(3, 3, TileKind::Path)
        .with_tile(Tile::of_kind(CellCoord::new(0, 1), TileKind::Grass))
        .and_then(|grid| grid.with_tile(Tile::of_kind(CellCoord::new(1, 0), TileKind::Grass)))
        .expect("in bounds");
    let map = ContextualMap::new(grid);
    let rat = placed(&map, &ids, EntityKind::Rat, CellCoord::new(1, 1));

    for seed in 0..32 {
        let mut handler =
            MovementHandler::new(rat.clone(), seed).with_tile_blacklist([TileKind::Grass]);
        let outcome = handler.evaluate(&map).expect("evaluated");
        assert_eq!(outcome.destination(), Some(CellCoord::new(1, 2)));
    }
}

#[test]
fn blacklisted_occupant_blocks_destination() {
    let ids = SequentialIds::new();
    let map = path_map(2, 1);
    let rat = placed(&map, &ids, EntityKind::Rat, CellCoord::new(1, 0));
    let predator = placed(&map, &ids, EntityKind::DeathRat, CellCoord::new(0, 0));
    let _bystander = placed(&map, &ids, EntityKind::Rat, CellCoord::new(0, 0));

    let mut terse = MovementHandler::new(rat.clone(), 1)
        .with_entity_blacklist([EntityKind::DeathRat]);
    let outcome = terse.evaluate(&map).expect("evaluated");
    let proposal = outcome.proposal().expect("destination chosen");
    assert!(proposal.is_blocked());
    assert_eq!(proposal.blocking().len(), 1);
    assert_eq!(proposal.blocking()[0].id(), predator.id());

    let mut verbose = MovementHandler::new(rat, 1)
        .with_entity_blacklist([EntityKind::DeathRat])
        .with_verbose(true);
    let outcome = verbose.evaluate(&map).expect("evaluated");
    let proposal = outcome.proposal().expect("destination chosen");
    assert!(proposal.is_blocked());
    let blockers: Vec<_> = proposal.blocking().iter().map(|entity| entity.id()).collect();
    assert_eq!(blockers, vec![predator.id()]);
}

#[test]
fn verbose_mode_reports_every_blocker() {
    let ids = SequentialIds::new();
    let map = path_map(2, 1);
    let rat = placed(&map, &ids, EntityKind::Rat, CellCoord::new(1, 0));
    let first = placed(&map, &ids, EntityKind::DeathRat, CellCoord::new(0, 0));
    let second = placed(&map, &ids, EntityKind::NoEntry, CellCoord::new(0, 0));
    let blacklist = [EntityKind::DeathRat, EntityKind::NoEntry];

    let mut terse = MovementHandler::new(rat.clone(), 1).with_entity_blacklist(blacklist);
    let outcome = terse.evaluate(&map).expect("evaluated");
    assert_eq!(outcome.proposal().expect("chosen").blocking().len(), 1);

    let mut verbose = MovementHandler::new(rat, 1)
        .with_entity_blacklist(blacklist)
        .with_verbose(true);
    let outcome = verbose.evaluate(&map).expect("evaluated");
    let blockers: BTreeSet<_> = outcome
        .proposal()
        .expect("chosen")
        .blocking()
        .iter()
        .map(|entity| entity.id())
        .collect();
    assert_eq!(blockers, [first.id(), second.id()].into_iter().collect());
}

#[test]
fn unblacklisted_occupants_do_not_block() {
    let ids = SequentialIds::new();
    let map = path_map(2, 1);
    let rat = placed(&map, &ids, EntityKind::Rat, CellCoord::new(1, 0));
    let _neighbour = placed(&map, &ids, EntityKind::Rat, CellCoord::new(0, 0));

    let mut handler =
        MovementHandler::new(rat, 1).with_entity_blacklist([EntityKind::DeathRat]);
    let outcome = handler.evaluate(&map).expect("evaluated");
    let proposal = outcome.proposal().expect("chosen");
    assert!(!proposal.is_blocked());
    assert!(proposal.blocking().is_empty());
}

#[test]
fn blocked_evaluation_still_remembers_origin() {
    let ids = SequentialIds::new();
    let map = path_map(2, 1);
    let rat = placed(&map, &ids, EntityKind::Rat, CellCoord::new(1, 0));
    let _barrier = placed(&map, &ids, EntityKind::NoEntry, CellCoord::new(0, 0));
    let mut handler =
        MovementHandler::new(rat.clone(), 1).with_entity_blacklist([EntityKind::NoEntry]);

    let outcome = handler.evaluate(&map).expect("evaluated");
    let proposal = outcome.proposal().expect("chosen");
    assert!(!handler.commit(&map, proposal).expect("commit is a no-op"));
    assert_eq!(rat.position(), CellCoord::new(1, 0));
    assert_eq!(handler.previous_position(), Some(CellCoord::new(1, 0)));
}

#[test]
fn surrounded_entity_stays_put() {
    let ids = SequentialIds::new();
    let map = ContextualMap::new(
        TileGrid::uniform(3, 3, TileKind::Grass)
            .with_tile(Tile::of_kind(CellCoord::new(1, 1), TileKind::Path))
            .expect("in bounds"),
    );
    let rat = placed(&map, &ids, EntityKind::Rat, CellCoord::new(1, 1));
    let mut handler = MovementHandler::new(rat, 1).with_tile_blacklist([TileKind::Grass]);

    assert!(matches!(handler.evaluate(&map), Ok(MoveOutcome::Stay)));
    assert_eq!(handler.previous_position(), None);
}

#[test]
fn unplaced_entity_is_reported_missing() {
    let ids = SequentialIds::new();
    let map = path_map(2, 2);
    let ghost = Entity::spawn(&ids, EntityKind::Rat, CellCoord::new(0, 0), 1);
    let mut handler = MovementHandler::new(ghost.clone(), 1);

    assert_eq!(
        handler.evaluate(&map).map(|outcome| outcome.destination()).err(),
        Some(MovementError::Map(MapError::NotPresent(ghost.id())))
    );
}

#[test]
fn wandering_branches_are_chosen_at_random() {
    let ids = SequentialIds::new();
    let map = path_map(3, 3);
    let rat = placed(&map, &ids, EntityKind::Rat, CellCoord::new(1, 1));
    let centre = map.node(CellCoord::new(1, 1)).expect("in bounds");
    let mut destinations = BTreeSet::new();

    for seed in 0..64 {
        let mut handler = MovementHandler::new(rat.clone(), seed);
        let first = handler.evaluate(&map).expect("evaluated");
        let proposal = first.proposal().expect("chosen");
        assert!(handler.commit(&map, proposal).expect("committed"));
        assert_eq!(rat.position(), CellCoord::new(0, 1));

        let second = handler.evaluate(&map).expect("evaluated");
        let destination = second.destination().expect("chosen");
        assert_ne!(destination, CellCoord::new(1, 1), "backtracked with onward cells");
        let _ = destinations.insert(destination);

        map.move_to(&rat, centre).expect("reset");
    }

    assert_eq!(
        destinations,
        [CellCoord::new(0, 0), CellCoord::new(0, 2)].into_iter().collect()
    );
}

proptest! {
    #[test]
    fn corridor_walker_only_backtracks_at_dead_ends(
        length in 2u32..12,
        start in 0u32..12,
        seed in any::<u64>(),
        steps in 1usize..60,
    ) {
        let start = start % length;
        let ids = SequentialIds::new();
        let map = path_map(1, length);
        let rat = placed(&map, &ids, EntityKind::Rat, CellCoord::new(0, start));
        let mut handler = MovementHandler::new(rat.clone(), seed);
        let mut previous: Option<CellCoord> = None;

        for _ in 0..steps {
            let origin = rat.position();
            let outcome = handler.evaluate(&map).expect("evaluated");
            let proposal = outcome.proposal().expect("corridor always offers a neighbour");
            let destination = proposal.to().cell();

            if Some(destination) == previous {
                let at_end = origin.column() == 0 || origin.column() + 1 == length;
                prop_assert!(at_end, "backtracked from {} with an onward cell available", origin);
            }

            prop_assert!(handler.commit(&map, proposal).expect("committed"));
            previous = Some(origin);
        }
    }
}
