use std::ops::{Index, IndexMut};

/// Dense 3-D grid including a one-cell ghost layer on every face.
///
/// The extents `nx × ny × nz` include the ghost layers, so the interior spans `1..nx-1` along
/// x (and likewise for y and z). Storage is x-fastest.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    nx: usize,
    ny: usize,
    nz: usize,
    data: Box<[f64]>,
}

impl Grid {
    /// Creates a zeroed grid with the given extents, ghost layers included.
    ///
    /// # Panics
    /// Panics if any extent is smaller than 3, i.e. if the grid has no interior.
    pub fn new(nx: usize, ny: usize, nz: usize) -> Self {
        assert!(
            nx >= 3 && ny >= 3 && nz >= 3,
            "grid {}x{}x{} has no interior",
            nx,
            ny,
            nz
        );

        Self {
            nx,
            ny,
            nz,
            data: vec![0.0; nx * ny * nz].into_boxed_slice(),
        }
    }

    /// Creates a zeroed grid with `nx × ny × nz` interior cells.
    pub fn with_interior(nx: usize, ny: usize, nz: usize) -> Self {
        Self::new(nx + 2, ny + 2, nz + 2)
    }

    #[inline]
    pub fn extents(&self) -> [usize; 3] {
        [self.nx, self.ny, self.nz]
    }

    #[inline]
    pub fn nx(&self) -> usize {
        self.nx
    }

    #[inline]
    pub fn ny(&self) -> usize {
        self.ny
    }

    #[inline]
    pub fn nz(&self) -> usize {
        self.nz
    }

    #[inline]
    fn linearize(&self, x: usize, y: usize, z: usize) -> usize {
        debug_assert!(x < self.nx && y < self.ny && z < self.nz);
        x + self.nx * (y + self.ny * z)
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize, z: usize) -> f64 {
        self.data[self.linearize(x, y, z)]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, z: usize, value: f64) {
        let index = self.linearize(x, y, z);
        self.data[index] = value;
    }

    /// Sets every interior cell to `fun(x, y, z)`. Ghost cells are left untouched.
    pub fn fill_interior<F: FnMut(usize, usize, usize) -> f64>(&mut self, mut fun: F) {
        for z in 1..self.nz - 1 {
            for y in 1..self.ny - 1 {
                for x in 1..self.nx - 1 {
                    self.set(x, y, z, fun(x, y, z));
                }
            }
        }
    }

    /// Sum over the interior cells.
    pub fn interior_sum(&self) -> f64 {
        let mut sum = 0.0;

        for z in 1..self.nz - 1 {
            for y in 1..self.ny - 1 {
                for x in 1..self.nx - 1 {
                    sum += self.get(x, y, z);
                }
            }
        }

        sum
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }
}

impl Index<(usize, usize, usize)> for Grid {
    type Output = f64;

    #[inline]
    fn index(&self, (x, y, z): (usize, usize, usize)) -> &f64 {
        &self.data[self.linearize(x, y, z)]
    }
}

impl IndexMut<(usize, usize, usize)> for Grid {
    #[inline]
    fn index_mut(&mut self, (x, y, z): (usize, usize, usize)) -> &mut f64 {
        let index = self.linearize(x, y, z);
        &mut self.data[index]
    }
}
