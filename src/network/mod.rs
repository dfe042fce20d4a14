//! Point-to-point transport of halo buffers between subdomains.
mod local;

pub use self::local::{LocalHandle, LocalNetwork};

use crate::halo::Direction;
use crate::prelude::*;
use std::fmt::{self, Display};

/// Identifier of a subdomain within the decomposition.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
pub struct SubdomainId(pub usize);

impl SubdomainId {
    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl Display for SubdomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("subdomain {0} does not exist")]
    InvalidSubdomain(SubdomainId),

    #[error("no halo buffer will arrive from the {0} neighbor")]
    NoNeighbor(Direction),

    #[error("connection was closed")]
    Disconnected,
}

/// Sends halo buffers to neighboring subdomains.
///
/// `send` returns once the buffer has been handed to the transport. On arrival, the transport
/// deposits the buffer for `step` into the receive channel of `neighbor` that faces back
/// towards the sender, i.e. the channel of `direction.opposite()`.
pub trait HaloTransport: Send + Sync {
    fn send(
        &self,
        direction: Direction,
        neighbor: SubdomainId,
        buffer: Vec<f64>,
        step: u64,
    ) -> Result<(), NetworkError>;
}
