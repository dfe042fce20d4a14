use crate::halo::{Direction, DirectionSet, HaloEndpoint};
use crate::network::{HaloTransport, LocalHandle, LocalNetwork, NetworkError, SubdomainId};
use crate::prelude::*;
use crate::types::{Grid, HaloConfig};
use crate::worker::TaskPool;
use ghostflow_core::util::{div_ceil, Future};
use serde::Serialize;
use std::sync::Arc;

/// Ghost layers a cell reads from, given its position in a grid with extents `[nx, ny, nz]`.
#[inline]
fn required_directions(extents: [usize; 3], x: usize, y: usize, z: usize) -> DirectionSet {
    let [nx, ny, nz] = extents;
    let mut set = DirectionSet::empty();

    if x == 1 {
        set.insert(Direction::West);
    }
    if x == nx - 2 {
        set.insert(Direction::East);
    }
    if y == 1 {
        set.insert(Direction::South);
    }
    if y == ny - 2 {
        set.insert(Direction::North);
    }
    if z == 1 {
        set.insert(Direction::Front);
    }
    if z == nz - 2 {
        set.insert(Direction::Back);
    }

    set
}

/// 7-point average of the cell `(x, y, z)` and its face neighbors.
#[inline]
fn average(grid: &Grid, x: usize, y: usize, z: usize) -> f64 {
    let sum = grid.get(x, y, z)
        + grid.get(x - 1, y, z)
        + grid.get(x + 1, y, z)
        + grid.get(x, y - 1, z)
        + grid.get(x, y + 1, z)
        + grid.get(x, y, z - 1)
        + grid.get(x, y, z + 1);

    sum / 7.0
}

/// One subdomain of the stencil application. The grid is updated Jacobi style: `next` is
/// computed from `grid`, then the two are swapped.
#[derive(Debug)]
pub struct Subdomain {
    grid: Grid,
    next: Grid,
    endpoint: HaloEndpoint,
    /// Global index of the first interior cell along each axis.
    origin: [usize; 3],
}

impl Subdomain {
    pub fn new(grid: Grid, endpoint: HaloEndpoint, origin: [usize; 3]) -> Self {
        Self {
            next: grid.clone(),
            grid,
            endpoint,
            origin,
        }
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn endpoint(&self) -> &HaloEndpoint {
        &self.endpoint
    }

    pub fn origin(&self) -> [usize; 3] {
        self.origin
    }

    /// Sends the faces of the current grid for `step` and registers the receives of `step`.
    /// Never blocks.
    pub fn begin_step(&mut self, step: u64, transport: &dyn HaloTransport) -> Result<(), NetworkError> {
        self.endpoint.post_sends(step, &self.grid, transport)?;
        self.endpoint.expect(step);
        Ok(())
    }

    /// Computes the cells of `step`: first every cell which needs no halo data, then, as the
    /// buffers of the individual directions arrive, every cell whose required ghost layers
    /// are all present.
    pub fn finish_step(&mut self) -> Result<(), NetworkError> {
        let mut arrived = self.endpoint.boundary();
        self.update(|required| required.is_subset(arrived));

        while let Some(direction) = self.endpoint.next_arrival() {
            self.endpoint.receive(direction, &mut self.grid)?;

            let just_arrived = DirectionSet::single(direction);
            arrived.insert(direction);

            self.update(|required| required.intersects(just_arrived) && required.is_subset(arrived));
        }

        swap(&mut self.grid, &mut self.next);
        Ok(())
    }

    pub fn step(&mut self, step: u64, transport: &dyn HaloTransport) -> Result<(), NetworkError> {
        self.begin_step(step, transport)?;
        self.finish_step()
    }

    fn update<F>(&mut self, select: F)
    where
        F: Fn(DirectionSet) -> bool,
    {
        let extents = self.grid.extents();
        let [nx, ny, nz] = extents;
        let (grid, next) = (&self.grid, &mut self.next);

        for z in 1..nz - 1 {
            for y in 1..ny - 1 {
                for x in 1..nx - 1 {
                    if select(required_directions(extents, x, y, z)) {
                        next.set(x, y, z, average(grid, x, y, z));
                    }
                }
            }
        }
    }
}

/// Shape of the stencil problem: the global interior extents and the number of subdomains
/// along each axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decomposition {
    pub global: [usize; 3],
    pub parts: [usize; 3],
}

impl Decomposition {
    pub fn num_subdomains(&self) -> usize {
        self.parts.iter().product()
    }

    /// Interior range `start..end` of part `index` along `axis`.
    fn range(&self, axis: usize, index: usize) -> (usize, usize) {
        let chunk = div_ceil(self.global[axis], self.parts[axis]);
        let start = index * chunk;
        (start, min(start + chunk, self.global[axis]))
    }

    fn validate(&self) -> Result {
        for axis in 0..3 {
            let (g, p) = (self.global[axis], self.parts[axis]);

            if g == 0 || p == 0 {
                bail!("decomposition {:?} has an empty axis", self);
            }

            let (start, end) = self.range(axis, p - 1);
            if start >= end {
                bail!(
                    "cannot split {} cells along axis {} into {} non-empty parts",
                    g,
                    axis,
                    p
                );
            }
        }

        Ok(())
    }

    fn coordinates(&self, id: usize) -> [usize; 3] {
        let [px, py, _] = self.parts;
        [id % px, (id / px) % py, id / (px * py)]
    }

    fn id(&self, [x, y, z]: [usize; 3]) -> SubdomainId {
        let [px, py, _] = self.parts;
        SubdomainId(x + px * (y + py * z))
    }

    fn neighbors(&self, id: usize) -> [Option<SubdomainId>; 6] {
        let c = self.coordinates(id);
        let mut out = [None; 6];

        for &d in &Direction::ALL {
            let axis = d.axis().index();
            let mut n = c;

            if d.geometry().upper {
                if c[axis] + 1 == self.parts[axis] {
                    continue;
                }
                n[axis] += 1;
            } else {
                if c[axis] == 0 {
                    continue;
                }
                n[axis] -= 1;
            }

            out[d.index()] = Some(self.id(n));
        }

        out
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StencilReport {
    pub decomposition: Decomposition,
    pub steps: u64,
    /// Sum over the interior of the global grid after every step.
    pub grid_sum: Vec<f64>,
}

/// The stencil application: several subdomains exchanging halos over a [`LocalNetwork`],
/// each step computed in parallel on the task pool.
#[derive(Debug)]
pub struct StencilSimulation {
    decomposition: Decomposition,
    subdomains: Vec<Arc<Mutex<Subdomain>>>,
    transport: LocalHandle,
    pool: TaskPool,
    step: u64,
    // Dropped last, after every subdomain has stopped using it.
    _network: LocalNetwork,
}

impl StencilSimulation {
    /// Creates the subdomains of `decomposition`, with interior cell `(x, y, z)` of the global
    /// grid set to `init(x, y, z)`. Ghost layers on the outer boundary stay zero.
    pub fn new<F>(decomposition: Decomposition, halo: &HaloConfig, pool: TaskPool, init: F) -> Result<Self>
    where
        F: Fn(usize, usize, usize) -> f64,
    {
        decomposition.validate()?;

        let mut subdomains = vec![];
        for id in 0..decomposition.num_subdomains() {
            let c = decomposition.coordinates(id);
            let ranges = [
                decomposition.range(0, c[0]),
                decomposition.range(1, c[1]),
                decomposition.range(2, c[2]),
            ];
            let origin = [ranges[0].0, ranges[1].0, ranges[2].0];

            let mut grid = Grid::with_interior(
                ranges[0].1 - ranges[0].0,
                ranges[1].1 - ranges[1].0,
                ranges[2].1 - ranges[2].0,
            );
            grid.fill_interior(|x, y, z| init(origin[0] + x - 1, origin[1] + y - 1, origin[2] + z - 1));

            let endpoint = HaloEndpoint::new(SubdomainId(id), decomposition.neighbors(id), halo);
            subdomains.push(Subdomain::new(grid, endpoint, origin));
        }

        let network = LocalNetwork::new(subdomains.iter().map(|s| s.endpoint.inbox()).collect())?;

        info!(
            "stencil: {:?} cells split into {:?} subdomains",
            decomposition.global, decomposition.parts
        );

        Ok(Self {
            decomposition,
            subdomains: subdomains
                .into_iter()
                .map(|s| Arc::new(Mutex::new(s)))
                .collect(),
            transport: network.handle(),
            pool,
            step: 0,
            _network: network,
        })
    }

    pub fn decomposition(&self) -> &Decomposition {
        &self.decomposition
    }

    /// Sum over the interior cells of all subdomains.
    pub fn grid_sum(&self) -> f64 {
        self.subdomains.iter().map(|s| s.lock().grid().interior_sum()).sum()
    }

    /// Value of global interior cell `(x, y, z)`.
    pub fn value(&self, x: usize, y: usize, z: usize) -> Option<f64> {
        let p = [x, y, z];

        self.subdomains.iter().find_map(|s| {
            let s = s.lock();
            let origin = s.origin();
            let extents = s.grid().extents();
            let mut local = [0; 3];

            for axis in 0..3 {
                let offset = p[axis].checked_sub(origin[axis])?;
                if offset >= extents[axis] - 2 {
                    return None;
                }

                local[axis] = offset + 1;
            }

            Some(s.grid().get(local[0], local[1], local[2]))
        })
    }

    /// Runs `steps` steps. Every step first posts the sends of all subdomains and only then
    /// starts computing, so a worker never waits on a subdomain that has not been scheduled.
    pub fn run(&mut self, steps: u64) -> Result<StencilReport> {
        let mut grid_sum = vec![];

        for _ in 0..steps {
            let step = self.step;
            let subdomains = &self.subdomains;
            let transport = &self.transport;
            let errors = Mutex::new(vec![]);

            self.pool.scope_each(subdomains.len(), |i| {
                if let Err(e) = subdomains[i].lock().begin_step(step, transport) {
                    errors.lock().push(e);
                }
            });

            if let Some(e) = errors.into_inner().into_iter().next() {
                return Err(e).with_context(|| format!("stencil step {} failed to post sends", step));
            }

            let finished = enumerate(subdomains)
                .map(|(id, subdomain)| {
                    let subdomain = Arc::clone(subdomain);

                    self.pool
                        .spawn(move || {
                            let result = subdomain.lock().finish_step();
                            result
                        })
                        .map(move |result| result.with_context(|| format!("subdomain {} failed", id)))
                })
                .collect_vec();

            let results = Future::join_all(finished)
                .wait_or_err()
                .map_err(|_| anyhow!("stencil worker died during step {}", step))?;

            for result in results {
                result.with_context(|| format!("stencil step {} failed", step))?;
            }

            self.step += 1;
            grid_sum.push(self.grid_sum());
            trace!("stencil step {}: sum {}", step, grid_sum[grid_sum.len() - 1]);
        }

        Ok(StencilReport {
            decomposition: self.decomposition,
            steps,
            grid_sum,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::WorkerConfig;

    fn init(x: usize, y: usize, z: usize) -> f64 {
        ((x * 7 + y * 13 + z * 29) % 17) as f64
    }

    fn pool() -> TaskPool {
        TaskPool::new(&WorkerConfig {
            num_threads: Some(2),
        })
        .unwrap()
    }

    /// Undecomposed run of the same stencil.
    fn serial(global: [usize; 3], steps: usize) -> Grid {
        let [gx, gy, gz] = global;
        let mut grid = Grid::with_interior(gx, gy, gz);
        grid.fill_interior(|x, y, z| init(x - 1, y - 1, z - 1));
        let mut next = grid.clone();

        for _ in 0..steps {
            for z in 1..=gz {
                for y in 1..=gy {
                    for x in 1..=gx {
                        next.set(x, y, z, average(&grid, x, y, z));
                    }
                }
            }

            swap(&mut grid, &mut next);
        }

        grid
    }

    #[test]
    fn test_required_directions() {
        let extents = [5, 5, 3];
        assert!(required_directions(extents, 2, 2, 1).contains(Direction::Front));
        assert!(required_directions(extents, 2, 2, 1).contains(Direction::Back));
        assert!(!required_directions(extents, 2, 2, 1).contains(Direction::West));
        assert_eq!(
            required_directions(extents, 1, 3, 1),
            {
                let mut s = DirectionSet::single(Direction::West);
                s.insert(Direction::North);
                s.insert(Direction::Front);
                s.insert(Direction::Back);
                s
            }
        );
    }

    #[test]
    fn test_decomposition() {
        let d = Decomposition {
            global: [10, 4, 3],
            parts: [3, 2, 1],
        };
        d.validate().unwrap();

        assert_eq!(d.range(0, 0), (0, 4));
        assert_eq!(d.range(0, 2), (8, 10));
        assert_eq!(d.neighbors(0)[Direction::East.index()], Some(SubdomainId(1)));
        assert_eq!(d.neighbors(0)[Direction::North.index()], Some(SubdomainId(3)));
        assert_eq!(d.neighbors(0)[Direction::West.index()], None);
        assert_eq!(d.neighbors(4)[Direction::South.index()], Some(SubdomainId(1)));
        assert_eq!(d.neighbors(4)[Direction::Back.index()], None);

        let bad = Decomposition {
            global: [4, 4, 4],
            parts: [3, 1, 1],
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_matches_undecomposed_run() {
        let global = [9, 6, 5];
        let steps = 4;
        let expected = serial(global, steps);

        for &parts in &[[1, 1, 1], [2, 1, 1], [3, 2, 1], [2, 2, 2]] {
            let decomposition = Decomposition { global, parts };
            let mut sim = StencilSimulation::new(decomposition, &HaloConfig::default(), pool(), init).unwrap();

            let report = sim.run(steps as u64).unwrap();
            assert_eq!(report.grid_sum.len(), steps);

            for z in 0..global[2] {
                for y in 0..global[1] {
                    for x in 0..global[0] {
                        assert_eq!(
                            sim.value(x, y, z),
                            Some(expected.get(x + 1, y + 1, z + 1)),
                            "{:?} at {:?}",
                            parts,
                            (x, y, z)
                        );
                    }
                }
            }

            let diff = (report.grid_sum[steps - 1] - expected.interior_sum()).abs();
            assert!(diff <= 1e-9 * expected.interior_sum().abs());
        }
    }

    #[test]
    fn test_run_continues_steps() {
        let decomposition = Decomposition {
            global: [4, 4, 4],
            parts: [2, 2, 1],
        };
        let mut sim = StencilSimulation::new(decomposition, &HaloConfig::default(), pool(), init).unwrap();

        let first = sim.run(2).unwrap();
        let second = sim.run(3).unwrap();
        let all = {
            let mut sim = StencilSimulation::new(decomposition, &HaloConfig::default(), pool(), init).unwrap();
            sim.run(5).unwrap()
        };

        let combined = first.grid_sum.iter().chain(&second.grid_sum).copied().collect_vec();
        assert_eq!(combined, all.grid_sum);

        // The zero boundary drains the grid.
        assert!(all.grid_sum[4] < all.grid_sum[0]);
    }
}
