//! Host-side elementwise operations executed as a tree of tasks.
//!
//! Every operation takes a [`Policy`] which decides how the two halves of a split range are
//! executed: [`RayonPolicy`] submits them as work-stealing tasks to the current rayon pool while
//! [`SequentialPolicy`] runs them one after the other on the calling thread.
pub use host::elementwise::{host_for_each, host_for_each_range, host_transform_reduce};
pub use host::{Policy, RayonPolicy, SequentialPolicy, SharedMut, WORK_SPLIT_THRESHOLD};

mod host;
