//! The map files shipped in maps/ must parse and leave the seeded
//! entity positions reachable.

use std::path::Path;

use space::RoomLayout;

fn maps_dir() -> &'static Path {
    // Tests run with the package as cwd; maps/ lives at the workspace root.
    Path::new("../maps")
}

#[test]
fn overworld_parses_and_spawn_cells_are_clear() {
    let layout = RoomLayout::load(&maps_dir().join("overworld.json")).unwrap();
    assert_eq!((layout.height(), layout.width()), (20, 30));

    // Default spawn, tools, nodes and the cave-mouth portal.
    for (y, x) in [(5, 5), (8, 5), (8, 6), (12, 6), (8, 10), (14, 10), (10, 27), (10, 26)] {
        assert!(layout.in_bounds(y, x), "({y}, {x}) out of bounds");
        assert!(!layout.is_solid(y, x), "({y}, {x}) must be passable");
    }

    // The border is closed.
    assert!(layout.is_solid(0, 0));
    assert!(layout.is_solid(19, 29));
    assert!(layout.is_solid(0, 15));
}

#[test]
fn cavern_parses_and_portal_cells_are_clear() {
    let layout = RoomLayout::load(&maps_dir().join("cavern.json")).unwrap();
    assert_eq!((layout.height(), layout.width()), (20, 30));

    for (y, x) in [(10, 4), (10, 5)] {
        assert!(!layout.is_solid(y, x), "({y}, {x}) must be passable");
    }
    assert!(layout.is_solid(0, 0));
}
