use super::{pack, unpack, Direction, RecvChannel};
use crate::network::{HaloTransport, NetworkError, SubdomainId};
use crate::prelude::*;
use crate::profiling::{self, Category};
use crate::types::{Grid, HaloConfig};
use ghostflow_core::util::Future;
use std::sync::Arc;
use std::time::Instant;

/// Receive channels of one subdomain, one per direction. The transport deposits into these.
#[derive(Debug)]
pub struct Inbox {
    channels: Vec<RecvChannel<Vec<f64>>>,
}

impl Inbox {
    pub fn new(config: &HaloConfig) -> Self {
        Self {
            channels: Direction::ALL
                .iter()
                .map(|_| RecvChannel::new(config.recv_window))
                .collect(),
        }
    }

    /// Channel receiving the buffers which fill the ghost layer on the `direction` side.
    #[inline]
    pub fn channel(&self, direction: Direction) -> &RecvChannel<Vec<f64>> {
        &self.channels[direction.index()]
    }
}

/// Set of directions, one bit per [`Direction`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct DirectionSet(u8);

impl DirectionSet {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn single(direction: Direction) -> Self {
        Self(1 << direction.index())
    }

    #[inline]
    pub fn insert(&mut self, direction: Direction) {
        self.0 |= 1 << direction.index();
    }

    #[inline]
    pub fn contains(self, direction: Direction) -> bool {
        self.0 & (1 << direction.index()) != 0
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn is_subset(self, other: DirectionSet) -> bool {
        self.0 & !other.0 == 0
    }

    #[inline]
    pub fn intersects(self, other: DirectionSet) -> bool {
        self.0 & other.0 != 0
    }
}

/// Halo exchange state of one subdomain: who its neighbors are, where their buffers arrive,
/// and which receives of the current step are still outstanding.
#[derive(Debug)]
pub struct HaloEndpoint {
    id: SubdomainId,
    neighbors: [Option<SubdomainId>; 6],
    inbox: Arc<Inbox>,
    outstanding: Vec<Option<Future<Vec<f64>>>>,
}

impl HaloEndpoint {
    pub fn new(id: SubdomainId, neighbors: [Option<SubdomainId>; 6], config: &HaloConfig) -> Self {
        Self {
            id,
            neighbors,
            inbox: Arc::new(Inbox::new(config)),
            outstanding: Direction::ALL.iter().map(|_| None).collect(),
        }
    }

    pub fn id(&self) -> SubdomainId {
        self.id
    }

    pub fn neighbor(&self, direction: Direction) -> Option<SubdomainId> {
        self.neighbors[direction.index()]
    }

    pub fn inbox(&self) -> Arc<Inbox> {
        Arc::clone(&self.inbox)
    }

    /// Directions without a neighbor. Their ghost layers are never refreshed.
    pub fn boundary(&self) -> DirectionSet {
        let mut set = DirectionSet::empty();

        for &d in &Direction::ALL {
            if self.neighbor(d).is_none() {
                set.insert(d);
            }
        }

        set
    }

    /// Packs every face that has a neighbor and hands it to `transport` for `step`.
    pub fn post_sends(
        &self,
        step: u64,
        grid: &Grid,
        transport: &dyn HaloTransport,
    ) -> Result<(), NetworkError> {
        for &d in &Direction::ALL {
            if let Some(neighbor) = self.neighbor(d) {
                transport.send(d, neighbor, pack(d, grid), step)?;
            }
        }

        Ok(())
    }

    /// Registers the receives of `step` for every direction that has a neighbor.
    ///
    /// # Panics
    /// Panics if receives of an earlier step are still outstanding.
    pub fn expect(&mut self, step: u64) {
        for &d in &Direction::ALL {
            if self.neighbor(d).is_none() {
                continue;
            }

            let slot = &mut self.outstanding[d.index()];
            assert!(
                slot.is_none(),
                "subdomain {}: receive from {} still outstanding",
                self.id,
                d
            );

            *slot = Some(self.inbox.channel(d).expect(step));
        }
    }

    /// Directions with an outstanding receive.
    pub fn outstanding(&self) -> DirectionSet {
        let mut set = DirectionSet::empty();

        for &d in &Direction::ALL {
            if self.outstanding[d.index()].is_some() {
                set.insert(d);
            }
        }

        set
    }

    /// Picks the next direction to receive from: one whose buffer has already arrived if any,
    /// otherwise any outstanding one. Returns `None` once nothing is outstanding.
    pub fn next_arrival(&self) -> Option<Direction> {
        let mut fallback = None;

        for &d in &Direction::ALL {
            if let Some(future) = &self.outstanding[d.index()] {
                if future.is_ready() {
                    return Some(d);
                }

                fallback = fallback.or(Some(d));
            }
        }

        fallback
    }

    /// Waits for the outstanding buffer from `direction` and unpacks it into the ghost layer of
    /// `grid` on that side. The time spent waiting is recorded as `wait` and `wait_{axis}`.
    pub fn receive(&mut self, direction: Direction, grid: &mut Grid) -> Result<(), NetworkError> {
        let future = self.outstanding[direction.index()]
            .take()
            .ok_or(NetworkError::NoNeighbor(direction))?;

        let before = Instant::now();
        let buffer = future.wait_or_err().map_err(|_| NetworkError::Disconnected)?;
        profiling::record_all(
            &[Category::Wait, direction.axis().wait_category()],
            before.elapsed(),
        );

        unpack(direction, grid, buffer);
        Ok(())
    }
}
