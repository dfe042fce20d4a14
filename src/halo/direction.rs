use crate::profiling::Category;
use serde::Serialize;
use std::fmt::{self, Display};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn pack_category(self) -> Category {
        match self {
            Axis::X => Category::PackX,
            Axis::Y => Category::PackY,
            Axis::Z => Category::PackZ,
        }
    }

    pub fn wait_category(self) -> Category {
        match self {
            Axis::X => Category::WaitX,
            Axis::Y => Category::WaitY,
            Axis::Z => Category::WaitZ,
        }
    }
}

/// One of the six faces of a subdomain.
///
/// North/South are the high/low `y` faces, East/West the high/low `x` faces and Back/Front
/// the high/low `z` faces.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    North,
    South,
    East,
    West,
    Front,
    Back,
}

/// Shape of a face: which axis it is normal to, on which end of that axis it lies, and the
/// order in which its cells are visited.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FaceGeometry {
    pub normal: Axis,
    /// `true` if the face lies at the high end of `normal`.
    pub upper: bool,
    /// Slowest varying axis while visiting the face.
    pub outer: Axis,
    /// Fastest varying axis while visiting the face.
    pub inner: Axis,
}

impl FaceGeometry {
    /// Index along `normal` of the interior plane adjacent to the ghost layer.
    #[inline]
    pub fn interior_plane(&self, extent: usize) -> usize {
        if self.upper {
            extent - 2
        } else {
            1
        }
    }

    /// Index along `normal` of the ghost plane.
    #[inline]
    pub fn ghost_plane(&self, extent: usize) -> usize {
        if self.upper {
            extent - 1
        } else {
            0
        }
    }
}

const fn face(normal: Axis, upper: bool, outer: Axis, inner: Axis) -> FaceGeometry {
    FaceGeometry {
        normal,
        upper,
        outer,
        inner,
    }
}

// Indexed by `Direction as usize`.
const GEOMETRY: [FaceGeometry; 6] = [
    face(Axis::Y, true, Axis::Z, Axis::X),
    face(Axis::Y, false, Axis::Z, Axis::X),
    face(Axis::X, true, Axis::Z, Axis::Y),
    face(Axis::X, false, Axis::Z, Axis::Y),
    face(Axis::Z, false, Axis::Y, Axis::X),
    face(Axis::Z, true, Axis::Y, Axis::X),
];

impl Direction {
    pub const ALL: [Direction; 6] = [
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
        Direction::Front,
        Direction::Back,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn opposite(self) -> Direction {
        use Direction::*;

        match self {
            North => South,
            South => North,
            East => West,
            West => East,
            Front => Back,
            Back => Front,
        }
    }

    #[inline]
    pub fn geometry(self) -> &'static FaceGeometry {
        &GEOMETRY[self.index()]
    }

    #[inline]
    pub fn axis(self) -> Axis {
        self.geometry().normal
    }
}

impl Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Direction::North => "north",
            Direction::South => "south",
            Direction::East => "east",
            Direction::West => "west",
            Direction::Front => "front",
            Direction::Back => "back",
        };

        f.write_str(name)
    }
}
