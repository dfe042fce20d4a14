//! Halo (ghost cell) exchange between the subdomains of a structured grid.
//!
//! Each step, a subdomain [`pack`]s the interior plane next to every face that has a neighbor
//! and sends it. The neighbor finds the buffer in the [`RecvChannel`] of the opposite direction
//! under the same step and [`unpack`]s it into its ghost layer. Because buffers are keyed by
//! step, sends for step `k + 1` may be posted while step `k` is still being consumed.
mod channel;
mod direction;
mod endpoint;
mod pack;

pub use self::channel::RecvChannel;
pub use self::direction::{Axis, Direction, FaceGeometry};
pub use self::endpoint::{DirectionSet, HaloEndpoint, Inbox};
pub use self::pack::{face_len, pack, unpack};
