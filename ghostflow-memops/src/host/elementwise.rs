use crate::host::{host_recur, Policy, WORK_SPLIT_THRESHOLD};
use std::ops::Range;

/// Calls `fun(i)` for every `i` in `0..n`. No ordering between indices is guaranteed when the
/// policy is parallel, so invocations must not write to overlapping locations.
pub fn host_for_each<P, F>(policy: P, n: usize, fun: F)
where
    P: Policy,
    F: Fn(usize) + Sync,
{
    host_for_each_range(policy, n, |range| {
        for i in range {
            fun(i);
        }
    });
}

/// Like [`host_for_each`] but hands out contiguous pieces of `0..n`, which lets the callee hoist
/// per-piece setup out of the inner loop.
pub fn host_for_each_range<P, F>(policy: P, n: usize, fun: F)
where
    P: Policy,
    F: Fn(Range<usize>) + Sync,
{
    if n == 0 {
        return;
    }

    host_recur(policy, 0..n, WORK_SPLIT_THRESHOLD, &fun, &|(), ()| ());
}

/// Computes `combine(fun(0), combine(fun(1), ...))` over `0..n` in an unspecified order and
/// grouping. `combine` must be associative and commutative with `identity` as its neutral
/// element. Returns `identity` for `n == 0`.
///
/// For floating-point sums the result can differ in the last bits between runs with a parallel
/// policy.
pub fn host_transform_reduce<P, T, F, C>(policy: P, n: usize, identity: T, fun: F, combine: C) -> T
where
    P: Policy,
    T: Send + Sync + Copy,
    F: Fn(usize) -> T + Sync,
    C: Fn(T, T) -> T + Sync,
{
    if n == 0 {
        return identity;
    }

    let leaf = |range: Range<usize>| {
        let mut acc = identity;
        for i in range {
            acc = combine(acc, fun(i));
        }
        acc
    };

    host_recur(policy, 0..n, WORK_SPLIT_THRESHOLD, &leaf, &combine)
}
