use std::{
    collections::BTreeSet,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
};

use proptest::prelude::*;
use rat_game_core::{CellCoord, EntityKind, SequentialIds, TileGrid, TileKind};
use rat_game_world::{ContextualMap, Entity, EntityHandle};

const ROWS: u32 = 4;
const COLUMNS: u32 = 4;
const ENTITY_COUNT: usize = 5;

#[derive(Clone, Debug)]
enum Operation {
    Place(usize),
    MoveTo(usize, u32, u32),
    Occupy(usize, u32, u32),
    Kill(usize),
    Collect,
}

fn operation() -> impl Strategy<Value = Operation> {
    let entity = 0..ENTITY_COUNT;
    // Coordinates may fall one step outside the grid to exercise bounds errors.
    let row = 0..=ROWS;
    let column = 0..=COLUMNS;
    prop_oneof![
        entity.clone().prop_map(Operation::Place),
        (entity.clone(), row.clone(), column.clone())
            .prop_map(|(index, row, column)| Operation::MoveTo(index, row, column)),
        (entity.clone(), row, column)
            .prop_map(|(index, row, column)| Operation::Occupy(index, row, column)),
        entity.prop_map(Operation::Kill),
        Just(Operation::Collect),
    ]
}

fn fixture() -> (ContextualMap, Vec<EntityHandle>) {
    let ids = SequentialIds::new();
    let map = ContextualMap::new(TileGrid::uniform(ROWS, COLUMNS, TileKind::Path));
    let entities = (0..ENTITY_COUNT)
        .map(|index| {
            let index = u32::try_from(index).expect("small index");
            let cell = CellCoord::new(index % ROWS, (index * 3) % COLUMNS);
            Entity::spawn(&ids, EntityKind::Rat, cell, 3)
        })
        .collect();
    (map, entities)
}

fn assert_bidirectional(map: &ContextualMap) {
    for entity in map.entities() {
        for node in map.occupied_nodes_of(&entity).expect("registered entity") {
            assert!(
                node.contains(entity.id()),
                "node {} lost entity {}",
                node.cell(),
                entity.id()
            );
        }
    }

    for node in map.nodes() {
        for occupant in node.occupants() {
            let occupied = map
                .occupied_nodes_of(&occupant)
                .expect("occupant must be registered");
            assert!(
                occupied.iter().any(|candidate| candidate.cell() == node.cell()),
                "entity {} missing node {} from its occupied list",
                occupant.id(),
                node.cell()
            );
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn occupancy_stays_bidirectional(operations in prop::collection::vec(operation(), 1..64)) {
        let (map, entities) = fixture();

        for operation in operations {
            match operation {
                Operation::Place(index) => {
                    let _ = map.place(&entities[index]);
                }
                Operation::MoveTo(index, row, column) => {
                    let entity = &entities[index];
                    if let Ok(target) = map.node(CellCoord::new(row, column)) {
                        if map.move_to(entity, target).is_ok() {
                            let origin = map.origin_of(entity).expect("origin in bounds");
                            let occupied = map.occupied_nodes_of(entity).expect("present");
                            prop_assert!(occupied.iter().any(|node| node.cell() == origin.cell()));
                        }
                    }
                }
                Operation::Occupy(index, row, column) => {
                    if let Ok(node) = map.node(CellCoord::new(row, column)) {
                        let _ = map.occupy(&entities[index], node);
                    }
                }
                Operation::Kill(index) => entities[index].set_health(0),
                Operation::Collect => {
                    for reaped in map.collect_dead() {
                        prop_assert!(reaped.is_dead());
                        prop_assert!(!map.contains(reaped.id()));
                    }
                }
            }
            assert_bidirectional(&map);
        }
    }
}

#[test]
fn readers_never_observe_reaped_entities_after_collection() {
    let ids = SequentialIds::new();
    let map = Arc::new(ContextualMap::new(TileGrid::uniform(8, 8, TileKind::Path)));
    let mut doomed = Vec::new();
    for row in 0..8 {
        for column in 0..8 {
            let entity = Entity::spawn(&ids, EntityKind::Rat, CellCoord::new(row, column), 1);
            map.place(&entity).expect("placed");
            if (row + column) % 2 == 0 {
                doomed.push(entity);
            }
        }
    }
    for entity in &doomed {
        entity.set_health(0);
    }

    let collected = AtomicBool::new(false);
    thread::scope(|scope| {
        for _ in 0..4 {
            let map = Arc::clone(&map);
            let collected = &collected;
            let _reader = scope.spawn(move || {
                for _ in 0..200 {
                    let after_collection = collected.load(Ordering::Acquire);
                    for node in map.nodes() {
                        let occupants = node.occupants();
                        if after_collection {
                            assert!(occupants.iter().all(|entity| !entity.is_dead()));
                        }
                        let ids: BTreeSet<_> =
                            occupants.iter().map(|entity| entity.id()).collect();
                        assert_eq!(ids.len(), occupants.len());
                    }
                }
            });
        }
        let reaped = map.collect_dead();
        collected.store(true, Ordering::Release);
        assert_eq!(reaped.len(), doomed.len());
    });

    assert_eq!(map.len(), 32);
    assert!(map
        .nodes()
        .flat_map(|node| node.occupants())
        .all(|entity| !entity.is_dead()));
    assert_bidirectional(&map);
}

#[test]
fn concurrent_movers_keep_the_map_consistent() {
    let ids = SequentialIds::new();
    let map = Arc::new(ContextualMap::new(TileGrid::uniform(6, 6, TileKind::Path)));
    let movers: Vec<EntityHandle> = (0..6)
        .map(|row| Entity::spawn(&ids, EntityKind::Rat, CellCoord::new(row, 0), 1))
        .collect();
    for mover in &movers {
        map.place(mover).expect("placed");
    }

    thread::scope(|scope| {
        for mover in &movers {
            let map = Arc::clone(&map);
            let _worker = scope.spawn(move || {
                for step in 0..120u32 {
                    let target = CellCoord::new(mover.position().row(), step % 6);
                    let node = map.node(target).expect("in bounds");
                    map.move_to(mover, node).expect("registered");
                }
            });
        }
    });

    assert_bidirectional(&map);
    for mover in &movers {
        let occupied = map.occupied_nodes_of(mover).expect("present");
        assert_eq!(occupied.len(), 1);
        assert_eq!(occupied[0].cell(), mover.position());
    }
}

#[test]
fn snapshot_serializes_to_json() {
    let ids = SequentialIds::starting_at(41);
    let map = ContextualMap::new(TileGrid::uniform(3, 3, TileKind::Tunnel));
    let gas = Entity::spawn(&ids, EntityKind::Gas, CellCoord::new(1, 1), 2);
    map.restore(&gas, &[CellCoord::new(1, 2)]).expect("restored");

    let snapshot = map.snapshot();
    let json = serde_json::to_string(&snapshot).expect("serialize");
    let restored: rat_game_world::OccupancySnapshot =
        serde_json::from_str(&json).expect("deserialize");

    assert_eq!(restored, snapshot);
    assert_eq!(restored.highest_id().map(|id| id.get()), Some(41));
}
