use super::{Direction, FaceGeometry};
use crate::profiling::{self, Category};
use crate::types::Grid;
use std::time::Instant;

/// Number of cells in the face of `grid` on the `direction` side.
pub fn face_len(direction: Direction, grid: &Grid) -> usize {
    let g = direction.geometry();
    let extents = grid.extents();

    extents[g.outer.index()] * extents[g.inner.index()]
}

/// Visits every cell of the plane `plane` normal to `g.normal`: `g.outer` slowest, `g.inner`
/// fastest, each over its full extent (ghost cells included).
#[inline]
fn visit_face<F>(g: &FaceGeometry, extents: [usize; 3], plane: usize, mut fun: F)
where
    F: FnMut([usize; 3]),
{
    let mut p = [0; 3];
    p[g.normal.index()] = plane;

    for outer in 0..extents[g.outer.index()] {
        p[g.outer.index()] = outer;

        for inner in 0..extents[g.inner.index()] {
            p[g.inner.index()] = inner;
            fun(p);
        }
    }
}

/// Copies the interior plane adjacent to the `direction` ghost layer into a new buffer.
pub fn pack(direction: Direction, grid: &Grid) -> Vec<f64> {
    let before = Instant::now();
    let g = direction.geometry();
    let extents = grid.extents();
    let plane = g.interior_plane(extents[g.normal.index()]);

    let mut buffer = Vec::with_capacity(face_len(direction, grid));
    visit_face(g, extents, plane, |[x, y, z]| buffer.push(grid.get(x, y, z)));

    profiling::record_all(&[Category::Pack, g.normal.pack_category()], before.elapsed());
    buffer
}

/// Writes `buffer` into the ghost layer of `grid` on the `direction` side, visiting cells in
/// the same order as [`pack`]. A buffer produced by `pack(d, ..)` on one subdomain is unpacked
/// with `d.opposite()` on the neighbor.
///
/// # Panics
/// Panics if the length of `buffer` does not match the face.
pub fn unpack(direction: Direction, grid: &mut Grid, buffer: Vec<f64>) {
    let before = Instant::now();
    let g = direction.geometry();
    let extents = grid.extents();

    assert_eq!(
        buffer.len(),
        face_len(direction, grid),
        "halo buffer does not fit the {} face",
        direction
    );

    let plane = g.ghost_plane(extents[g.normal.index()]);
    let mut index = 0;

    visit_face(g, extents, plane, |[x, y, z]| {
        grid.set(x, y, z, buffer[index]);
        index += 1;
    });

    profiling::record(Category::Unpack, before.elapsed());
}

#[cfg(test)]
mod test {
    use super::*;

    fn numbered(nx: usize, ny: usize, nz: usize, offset: f64) -> Grid {
        let mut grid = Grid::new(nx, ny, nz);

        for z in 0..nz {
            for y in 0..ny {
                for x in 0..nx {
                    grid.set(x, y, z, offset + (x + 10 * y + 100 * z) as f64);
                }
            }
        }

        grid
    }

    #[test]
    fn test_face_len() {
        let grid = Grid::new(4, 5, 6);
        assert_eq!(face_len(Direction::North, &grid), 4 * 6);
        assert_eq!(face_len(Direction::West, &grid), 5 * 6);
        assert_eq!(face_len(Direction::Back, &grid), 4 * 5);
    }

    #[test]
    fn test_pack_order() {
        let grid = numbered(3, 4, 3, 0.0);

        // North: plane y = ny - 2 = 2, z outer, x inner.
        let expected = (0..3)
            .flat_map(|z| (0..3).map(move |x| (x + 20 + 100 * z) as f64))
            .collect::<Vec<_>>();
        assert_eq!(pack(Direction::North, &grid), expected);

        // Front: plane z = 1, y outer, x inner.
        let expected = (0..4)
            .flat_map(|y| (0..3).map(move |x| (x + 10 * y + 100) as f64))
            .collect::<Vec<_>>();
        assert_eq!(pack(Direction::Front, &grid), expected);
    }

    #[test]
    fn test_round_trip_all_directions() {
        let (nx, ny, nz) = (5, 4, 6);
        let source = numbered(nx, ny, nz, 0.0);

        for &d in &Direction::ALL {
            let g = d.geometry();
            let mut target = numbered(nx, ny, nz, 1e6);
            let before = target.clone();

            unpack(d.opposite(), &mut target, pack(d, &source));

            let extents = source.extents();
            let src_plane = g.interior_plane(extents[g.normal.index()]);
            let dst_plane = d.opposite().geometry().ghost_plane(extents[g.normal.index()]);

            for z in 0..nz {
                for y in 0..ny {
                    for x in 0..nx {
                        let p = [x, y, z];
                        let n = p[g.normal.index()];

                        if n == dst_plane {
                            let mut q = p;
                            q[g.normal.index()] = src_plane;
                            assert_eq!(target.get(x, y, z), source.get(q[0], q[1], q[2]), "{}", d);
                        } else {
                            assert_eq!(target.get(x, y, z), before.get(x, y, z), "{}", d);
                        }
                    }
                }
            }
        }
    }

    #[test]
    #[should_panic]
    fn test_unpack_wrong_length() {
        let mut grid = Grid::new(3, 3, 3);
        unpack(Direction::East, &mut grid, vec![0.0; 4]);
    }
}
