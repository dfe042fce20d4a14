use std::marker::PhantomData;
use std::ops::Range;

pub(crate) mod elementwise;

/// Ranges shorter than this are not split any further.
pub const WORK_SPLIT_THRESHOLD: usize = 1024;

/// Raw pointer into an output slice which can be shared among tasks.
///
/// Tasks must write to disjoint indices. This is the same contract as the loop bodies of the
/// elementwise operations: invocation `i` only touches `output[i]` (or a location derived from
/// `i` through an injective map).
#[derive(Debug)]
pub struct SharedMut<'a, T> {
    ptr: *mut T,
    len: usize,
    phantom: PhantomData<&'a mut [T]>,
}

unsafe impl<'a, T: Send> Send for SharedMut<'a, T> {}
unsafe impl<'a, T: Send> Sync for SharedMut<'a, T> {}

impl<'a, T> Clone for SharedMut<'a, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, T> Copy for SharedMut<'a, T> {}

impl<'a, T> SharedMut<'a, T> {
    pub fn new(slice: &'a mut [T]) -> Self {
        Self {
            ptr: slice.as_mut_ptr(),
            len: slice.len(),
            phantom: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// # Safety
    /// No other task may access index `i` concurrently.
    #[inline(always)]
    pub unsafe fn get_mut(&self, i: usize) -> &mut T {
        assert!(i < self.len, "index {} out of bounds ({})", i, self.len);
        &mut *self.ptr.add(i)
    }

    /// # Safety
    /// No other task may access index `i` concurrently.
    #[inline(always)]
    pub unsafe fn write(&self, i: usize, value: T) {
        *self.get_mut(i) = value;
    }
}

pub trait Policy: Sized + Copy + Send {
    fn join<A, B, RA, RB>(self, left: A, right: B) -> (RA, RB)
    where
        A: FnOnce(Self) -> RA + Send,
        B: FnOnce(Self) -> RB + Send,
        RA: Send,
        RB: Send;

    /// Returns `true` if the halves of a split are executed as separate tasks.
    fn is_parallel(&self) -> bool;
}

#[derive(Debug, Clone, Copy)]
pub struct RayonPolicy;
impl Policy for RayonPolicy {
    fn join<A, B, RA, RB>(self, left: A, right: B) -> (RA, RB)
    where
        A: FnOnce(Self) -> RA + Send,
        B: FnOnce(Self) -> RB + Send,
        RA: Send,
        RB: Send,
    {
        rayon::join(|| left(Self), || right(Self))
    }

    fn is_parallel(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SequentialPolicy;
impl Policy for SequentialPolicy {
    fn join<A, B, RA, RB>(self, left: A, right: B) -> (RA, RB)
    where
        A: FnOnce(Self) -> RA + Send,
        B: FnOnce(Self) -> RB + Send,
        RA: Send,
        RB: Send,
    {
        (left(Self), right(Self))
    }

    fn is_parallel(&self) -> bool {
        false
    }
}

/// Splits `range` in halves until it is shorter than `grain` and calls `leaf` on every piece.
/// The results of the two halves of every split are merged using `combine`.
pub(crate) fn host_recur<P, T>(
    policy: P,
    range: Range<usize>,
    grain: usize,
    leaf: &(dyn Fn(Range<usize>) -> T + Sync),
    combine: &(dyn Fn(T, T) -> T + Sync),
) -> T
where
    P: Policy,
    T: Send,
{
    let len = range.end - range.start;
    let half = len / 2;

    if len > grain && half >= 1 {
        let middle = range.start + half;
        let (lo, hi) = (range.start..middle, middle..range.end);

        let (a, b) = policy.join(
            move |policy| host_recur(policy, lo, grain, leaf, combine),
            move |policy| host_recur(policy, hi, grain, leaf, combine),
        );

        return combine(a, b);
    }

    leaf(range)
}
