use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Coord;

/// Closed set of terrain tags a map cell can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Terrain {
    Grass,
    Sand,
    Stone,
    Water,
    Wall,
    Rock,
    Leaves,
}

/// The three stacked lookup tables of a room map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Ground,
    Solid,
    Roof,
}

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("io error reading map: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed map file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("map cell ({y}, {x}) outside declared {height}x{width} bounds")]
    CellOutOfBounds {
        y: i32,
        x: i32,
        height: i32,
        width: i32,
    },
}

#[derive(Debug, Deserialize)]
struct LayoutFile {
    height: i32,
    width: i32,
    #[serde(default)]
    ground: Vec<(i32, i32, Terrain)>,
    #[serde(default)]
    solid: Vec<(i32, i32, Terrain)>,
    #[serde(default)]
    roof: Vec<(i32, i32, Terrain)>,
}

/// Static per-room map data: dimensions plus ground/solid/roof layers.
///
/// Movement only consults `in_bounds` and `is_solid`; the ground and roof
/// layers are forwarded to clients for rendering.
#[derive(Debug, Clone)]
pub struct RoomLayout {
    height: i32,
    width: i32,
    ground: BTreeMap<Coord, Terrain>,
    solid: BTreeMap<Coord, Terrain>,
    roof: BTreeMap<Coord, Terrain>,
}

impl RoomLayout {
    /// Parse a layout from its JSON representation.
    pub fn parse(json: &str) -> Result<Self, LayoutError> {
        let file: LayoutFile = serde_json::from_str(json)?;
        let mut layout = Self {
            height: file.height,
            width: file.width,
            ground: BTreeMap::new(),
            solid: BTreeMap::new(),
            roof: BTreeMap::new(),
        };
        for (cells, layer) in [
            (&file.ground, Layer::Ground),
            (&file.solid, Layer::Solid),
            (&file.roof, Layer::Roof),
        ] {
            for &(y, x, terrain) in cells {
                if !layout.in_bounds(y, x) {
                    return Err(LayoutError::CellOutOfBounds {
                        y,
                        x,
                        height: file.height,
                        width: file.width,
                    });
                }
                layout.layer_mut(layer).insert(Coord::new(y, x), terrain);
            }
        }
        Ok(layout)
    }

    /// Load a layout from a JSON map file on disk.
    pub fn load(path: &Path) -> Result<Self, LayoutError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Fallback layout: an open grass field enclosed by walls.
    ///
    /// Used for rooms whose map file is missing so the world stays playable.
    pub fn field(height: i32, width: i32) -> Self {
        let mut ground = BTreeMap::new();
        let mut solid = BTreeMap::new();
        for y in 0..height {
            for x in 0..width {
                let edge = y == 0 || x == 0 || y == height - 1 || x == width - 1;
                if edge {
                    solid.insert(Coord::new(y, x), Terrain::Wall);
                } else {
                    ground.insert(Coord::new(y, x), Terrain::Grass);
                }
            }
        }
        Self {
            height,
            width,
            ground,
            solid,
            roof: BTreeMap::new(),
        }
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn in_bounds(&self, y: i32, x: i32) -> bool {
        y >= 0 && y < self.height && x >= 0 && x < self.width
    }

    /// Whether the solid layer blocks movement into this cell.
    pub fn is_solid(&self, y: i32, x: i32) -> bool {
        self.solid.contains_key(&Coord::new(y, x))
    }

    pub fn terrain_at(&self, layer: Layer, y: i32, x: i32) -> Option<Terrain> {
        self.layer_ref(layer).get(&Coord::new(y, x)).copied()
    }

    /// Cells of a layer as (y, x, terrain) triples, sorted by coordinate.
    pub fn layer_cells(&self, layer: Layer) -> Vec<(i32, i32, Terrain)> {
        self.layer_ref(layer)
            .iter()
            .map(|(c, t)| (c.y, c.x, *t))
            .collect()
    }

    fn layer_ref(&self, layer: Layer) -> &BTreeMap<Coord, Terrain> {
        match layer {
            Layer::Ground => &self.ground,
            Layer::Solid => &self.solid,
            Layer::Roof => &self.roof,
        }
    }

    fn layer_mut(&mut self, layer: Layer) -> &mut BTreeMap<Coord, Terrain> {
        match layer {
            Layer::Ground => &mut self.ground,
            Layer::Solid => &mut self.solid,
            Layer::Roof => &mut self.roof,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SMALL_MAP: &str = r#"{
        "height": 4,
        "width": 5,
        "ground": [[1, 1, "Grass"], [1, 2, "Sand"]],
        "solid": [[0, 0, "Wall"], [2, 3, "Rock"]],
        "roof": [[1, 1, "Leaves"]]
    }"#;

    #[test]
    fn parse_layers() {
        let layout = RoomLayout::parse(SMALL_MAP).unwrap();
        assert_eq!(layout.height(), 4);
        assert_eq!(layout.width(), 5);
        assert_eq!(layout.terrain_at(Layer::Ground, 1, 1), Some(Terrain::Grass));
        assert_eq!(layout.terrain_at(Layer::Ground, 1, 2), Some(Terrain::Sand));
        assert_eq!(layout.terrain_at(Layer::Roof, 1, 1), Some(Terrain::Leaves));
        assert_eq!(layout.terrain_at(Layer::Ground, 3, 3), None);
    }

    #[test]
    fn parse_missing_layers_default_empty() {
        let layout = RoomLayout::parse(r#"{"height": 2, "width": 2}"#).unwrap();
        assert!(layout.layer_cells(Layer::Ground).is_empty());
        assert!(layout.layer_cells(Layer::Solid).is_empty());
    }

    #[test]
    fn parse_rejects_out_of_bounds_cell() {
        let bad = r#"{"height": 2, "width": 2, "solid": [[5, 0, "Wall"]]}"#;
        assert!(matches!(
            RoomLayout::parse(bad),
            Err(LayoutError::CellOutOfBounds { y: 5, .. })
        ));
    }

    #[test]
    fn parse_rejects_unknown_terrain() {
        let bad = r#"{"height": 2, "width": 2, "ground": [[0, 0, "Lava"]]}"#;
        assert!(matches!(RoomLayout::parse(bad), Err(LayoutError::Parse(_))));
    }

    #[test]
    fn solidity_and_bounds() {
        let layout = RoomLayout::parse(SMALL_MAP).unwrap();
        assert!(layout.is_solid(0, 0));
        assert!(layout.is_solid(2, 3));
        assert!(!layout.is_solid(1, 1));
        assert!(layout.in_bounds(3, 4));
        assert!(!layout.in_bounds(4, 0));
        assert!(!layout.in_bounds(0, 5));
        assert!(!layout.in_bounds(-1, 0));
    }

    #[test]
    fn load_from_disk() {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "{}", SMALL_MAP).unwrap();
        let layout = RoomLayout::load(f.path()).unwrap();
        assert_eq!(layout.height(), 4);
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let result = RoomLayout::load(Path::new("/nonexistent/map.json"));
        assert!(matches!(result, Err(LayoutError::Io(_))));
    }

    #[test]
    fn field_is_walled_rectangle() {
        let layout = RoomLayout::field(6, 8);
        assert!(layout.is_solid(0, 0));
        assert!(layout.is_solid(0, 7));
        assert!(layout.is_solid(5, 3));
        assert!(layout.is_solid(2, 0));
        assert!(!layout.is_solid(1, 1));
        assert_eq!(layout.terrain_at(Layer::Ground, 3, 3), Some(Terrain::Grass));
    }

    #[test]
    fn layer_cells_sorted() {
        let layout = RoomLayout::parse(SMALL_MAP).unwrap();
        let cells = layout.layer_cells(Layer::Solid);
        assert_eq!(cells, vec![(0, 0, Terrain::Wall), (2, 3, Terrain::Rock)]);
    }
}
