use serde::{Deserialize, Serialize};

/// Integer coordinate of a site on the sparse tumor lattice.
#[derive(Copy, Clone, Default, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Coord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Coord {
    /// Where the founding deme is always placed.
    pub const ORIGIN: Coord = Coord { x: 0, y: 0, z: 0 };

    #[inline(always)]
    pub const fn new(x: i32, y: i32, z: i32) -> Self { Self { x, y, z } }
    #[inline(always)]
    pub const fn planar(x: i32, y: i32) -> Self { Self { x, y, z: 0 } }
    #[inline(always)]
    pub fn add(self, other: Self) -> Self {
        Self::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }
    #[inline(always)]
    pub fn chebyshev(self, other: Self) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs()).max((self.z - other.z).abs())
    }
}

const VON_NEUMANN_2D: [Coord; 4] = [
    Coord::planar(1, 0),
    Coord::planar(-1, 0),
    Coord::planar(0, 1),
    Coord::planar(0, -1),
];

const MOORE_2D: [Coord; 8] = [
    Coord::planar(-1, -1),
    Coord::planar(0, -1),
    Coord::planar(1, -1),
    Coord::planar(-1, 0),
    Coord::planar(1, 0),
    Coord::planar(-1, 1),
    Coord::planar(0, 1),
    Coord::planar(1, 1),
];

const VON_NEUMANN_3D: [Coord; 6] = [
    Coord::new(1, 0, 0),
    Coord::new(-1, 0, 0),
    Coord::new(0, 1, 0),
    Coord::new(0, -1, 0),
    Coord::new(0, 0, 1),
    Coord::new(0, 0, -1),
];

const MOORE_3D: [Coord; 26] = {
    let mut offsets = [Coord::ORIGIN; 26];
    let mut k = 0;
    let mut dz = -1;
    while dz <= 1 {
        let mut dy = -1;
        while dy <= 1 {
            let mut dx = -1;
            while dx <= 1 {
                if dx != 0 || dy != 0 || dz != 0 {
                    offsets[k] = Coord::new(dx, dy, dz);
                    k += 1;
                }
                dx += 1;
            }
            dy += 1;
        }
        dz += 1;
    }
    offsets
};

/// Set of lattice offsets that count as "adjacent" for deme placement.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Neighborhood {
    #[serde(rename = "von_neumann_2d")]
    VonNeumann2d,
    #[default]
    #[serde(rename = "moore_2d")]
    Moore2d,
    #[serde(rename = "von_neumann_3d")]
    VonNeumann3d,
    #[serde(rename = "moore_3d")]
    Moore3d,
}

impl Neighborhood {
    pub fn offsets(self) -> &'static [Coord] {
        match self {
            Neighborhood::VonNeumann2d => &VON_NEUMANN_2D,
            Neighborhood::Moore2d => &MOORE_2D,
            Neighborhood::VonNeumann3d => &VON_NEUMANN_3D,
            Neighborhood::Moore3d => &MOORE_3D,
        }
    }

    /// The neighbors of `center`, in offset order.
    pub fn around(self, center: Coord) -> impl Iterator<Item = Coord> {
        self.offsets().iter().map(move |offset| center.add(*offset))
    }
}
