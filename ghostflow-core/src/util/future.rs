use crate::prelude::*;
use parking_lot::Condvar;
use std::fmt;
use std::mem::ManuallyDrop;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Value of `T` which will arrive at some later point in time.
#[derive(Debug)]
pub struct Future<T = ()> {
    inner: ManuallyDrop<Arc<Inner<T>>>,
}

/// Object used to resolve a `Future<T>`.
#[derive(Debug)]
pub struct Promise<T = ()> {
    inner: ManuallyDrop<Arc<Inner<T>>>,
}

type Callback<T> = Box<dyn FnOnce(Result<T, FutureError>) + Send>;

#[derive(Debug)]
struct Inner<T> {
    cond: Condvar,
    state: Mutex<State<T>>,
}

use State::*;

enum State<T> {
    Empty,
    Completed(T),
    Taken,
    Poisoned,
    Waiting(Callback<T>),
}

impl<T> fmt::Debug for State<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Empty => write!(f, "Empty"),
            Completed(_) => write!(f, "Completed(_)"),
            Taken => write!(f, "Taken"),
            Poisoned => write!(f, "Poisoned"),
            Waiting(_) => write!(f, "Waiting(_)"),
        }
    }
}

impl<T> Inner<T> {
    fn new(state: State<T>) -> Arc<Self> {
        Arc::new(Self {
            cond: Condvar::new(),
            state: Mutex::new(state),
        })
    }
}

impl<T> Promise<T> {
    /// Create a new future and promise. The promise should be given to the producer to write
    /// the value while the future must be given to the consumer to read the value.
    pub fn new() -> (Promise<T>, Future<T>) {
        let inner = Inner::new(Empty);
        let inner2 = Arc::clone(&inner);

        (
            Promise {
                inner: ManuallyDrop::new(inner),
            },
            Future {
                inner: ManuallyDrop::new(inner2),
            },
        )
    }

    /// Complete this promise with the given value. This will resolve the associated [`Future`].
    ///
    /// If a callback was attached to the future, it runs on the current thread after the
    /// internal lock has been released.
    pub fn complete(mut self, value: T) {
        let mut state = self.inner.state.lock();
        let callback = match replace(&mut *state, Poisoned) {
            Empty => {
                *state = Completed(value);
                self.inner.cond.notify_all();
                None
            }
            Waiting(fun) => Some((fun, value)),
            Poisoned => {
                // The consumer dropped the future, there is no point in writing the result.
                None
            }
            v => panic!("invalid state: {:?}", v),
        };
        drop(state);

        unsafe {
            ManuallyDrop::drop(&mut self.inner);
        }
        forget(self);

        if let Some((fun, value)) = callback {
            fun(Ok(value));
        }
    }
}

impl<T> Drop for Promise<T> {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock();
        let callback = match replace(&mut *state, Poisoned) {
            Empty => {
                self.inner.cond.notify_all();
                None
            }
            Waiting(fun) => Some(fun),
            Poisoned => None,
            v => panic!("invalid state: {:?}", v),
        };
        drop(state);

        unsafe {
            ManuallyDrop::drop(&mut self.inner);
        }

        if let Some(fun) = callback {
            fun(Err(FutureError));
        }
    }
}

/// Error indicating that a promise was dropped before it was completed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("promise dropped while waiting for future to complete")]
pub struct FutureError;

impl<T> Future<T> {
    /// Returns a future which is already resolved with `value`.
    pub fn ready(value: T) -> Self {
        Future {
            inner: ManuallyDrop::new(Inner::new(Completed(value))),
        }
    }

    /// Returns `true` if waiting on this future would not block, either because the value is
    /// available or because the associated [`Promise`] was dropped.
    pub fn is_ready(&self) -> bool {
        match &*self.inner.state.lock() {
            Completed(_) | Poisoned => true,
            _ => false,
        }
    }

    /// Blocks the caller until the value of `T` is available.
    ///
    /// # Panics
    /// Panic if the associated [`Promise`] was dropped without completing it.
    pub fn wait(self) -> T {
        self.wait_or_err().expect("failed to get value from future")
    }

    /// Blocks the caller until the value of `T` is available.
    ///
    /// Returns an error if the associated [`Promise`] was dropped without completing it.
    pub fn wait_or_err(self) -> Result<T, FutureError> {
        match self.wait_deadline(None) {
            Ok(result) => result,
            Err(_) => unreachable!(),
        }
    }

    /// Like [`Future::wait_or_err`], but gives up after `timeout`. On timeout the future is
    /// handed back to the caller so it can be waited on again.
    pub fn wait_timeout(self, timeout: Duration) -> Result<Result<T, FutureError>, Self> {
        self.wait_deadline(Some(Instant::now() + timeout))
    }

    fn wait_deadline(
        mut self,
        deadline: Option<Instant>,
    ) -> Result<Result<T, FutureError>, Self> {
        let mut state = self.inner.state.lock();
        let result = loop {
            match replace(&mut *state, Taken) {
                Empty => {
                    *state = Empty;

                    if let Some(deadline) = deadline {
                        if self.inner.cond.wait_until(&mut state, deadline).timed_out() {
                            if let Empty = &*state {
                                drop(state);
                                return Err(self);
                            }
                        }
                    } else {
                        self.inner.cond.wait(&mut state);
                    }
                }
                Completed(val) => break Ok(val),
                Poisoned => break Err(FutureError),
                v => panic!("invalid state: {:?}", v),
            }
        };

        drop(state);
        unsafe {
            ManuallyDrop::drop(&mut self.inner);
        }
        forget(self);

        Ok(result)
    }

    /// Maps an [`Future<T>`] to [`Future<R>`] using the supplied function `FnOnce(T) -> R`.
    pub fn map<F, R>(self, fun: F) -> Future<R>
    where
        F: FnOnce(T) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (promise, future) = Promise::new();
        self.attach_callback(move |result| {
            if let Ok(value) = result {
                promise.complete(fun(value))
            }
        });

        future
    }

    /// Attach a callback which will be called with `Ok(T)` when the value is available. The
    /// callback is called with `Err` if the associated [`Promise`] was dropped without
    /// completing it.
    ///
    /// Note that there are two scenarios:
    /// * The callback is called _immediately_ in the _current_ thread if the value is available.
    /// * The callback is called _later_ in a _different_ thread when [`Promise::complete`] is called.
    ///
    /// Due to the second case, it is important that the provided callback does not block or
    /// panic since that would propagate to the other thread.
    pub fn attach_callback<F>(self, fun: F)
    where
        F: FnOnce(Result<T, FutureError>) + Send + 'static,
    {
        self.attach_boxed_callback(Box::new(fun))
    }

    fn attach_boxed_callback(mut self, fun: Callback<T>) {
        let mut state = self.inner.state.lock();
        let ready = match replace(&mut *state, Taken) {
            Empty => {
                *state = Waiting(fun);
                None
            }
            Completed(val) => Some((fun, Ok(val))),
            Poisoned => Some((fun, Err(FutureError))),
            v => panic!("invalid state: {:?}", v),
        };

        drop(state);
        unsafe {
            ManuallyDrop::drop(&mut self.inner);
        }
        forget(self);

        if let Some((fun, result)) = ready {
            (fun)(result);
        }
    }
}

impl<T: Send + 'static> Future<T> {
    /// Combines several futures into one which resolves once all of them have resolved. The
    /// values are returned in the order of the input. If any of the promises is dropped, the
    /// combined future fails as well.
    pub fn join_all<I>(futures: I) -> Future<Vec<T>>
    where
        I: IntoIterator<Item = Future<T>>,
    {
        let futures = futures.into_iter().collect::<Vec<_>>();
        if futures.is_empty() {
            return Future::ready(vec![]);
        }

        struct Join<T> {
            values: Vec<Option<T>>,
            remaining: usize,
            promise: Option<Promise<Vec<T>>>,
        }

        let (promise, future) = Promise::new();
        let join = Arc::new(Mutex::new(Join {
            values: (0..futures.len()).map(|_| None).collect(),
            remaining: futures.len(),
            promise: Some(promise),
        }));

        for (index, fut) in enumerate(futures) {
            let join = Arc::clone(&join);

            fut.attach_callback(move |result| {
                let mut guard = join.lock();

                match result {
                    Ok(value) => {
                        guard.values[index] = Some(value);
                        guard.remaining -= 1;

                        if guard.remaining == 0 {
                            let values = take(&mut guard.values).into_iter().flatten().collect();
                            let promise = guard.promise.take();
                            drop(guard);

                            if let Some(promise) = promise {
                                promise.complete(values);
                            }
                        }
                    }
                    Err(_) => {
                        // Dropping the promise poisons the combined future.
                        let promise = guard.promise.take();
                        drop(guard);
                        drop(promise);
                    }
                }
            });
        }

        future
    }
}

impl<T> Drop for Future<T> {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock();
        *state = Poisoned;
        drop(state);

        unsafe {
            ManuallyDrop::drop(&mut self.inner);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::thread;

    #[test]
    fn test_ready() {
        let future = Future::ready(5);
        assert!(future.is_ready());
        assert_eq!(future.wait(), 5);
    }

    #[test]
    fn test_complete_from_other_thread() {
        let (promise, future) = Promise::new();
        assert!(!future.is_ready());

        let handle = thread::spawn(move || promise.complete(String::from("hello")));
        assert_eq!(future.wait(), "hello");
        handle.join().unwrap();
    }

    #[test]
    fn test_dropped_promise() {
        let (promise, future) = Promise::<u32>::new();
        drop(promise);

        assert!(future.is_ready());
        assert_eq!(future.wait_or_err(), Err(FutureError));
    }

    #[test]
    fn test_callback_before_and_after() {
        let (promise, future) = Promise::new();
        let (tx, rx) = crossbeam::channel::unbounded();

        let tx2 = tx.clone();
        future.attach_callback(move |v| tx2.send(v.unwrap()).unwrap());
        promise.complete(1);

        Future::ready(2).attach_callback(move |v| tx.send(v.unwrap()).unwrap());

        assert_eq!(rx.recv().unwrap(), 1);
        assert_eq!(rx.recv().unwrap(), 2);
    }

    #[test]
    fn test_map() {
        let (promise, future) = Promise::new();
        let future = future.map(|x: i32| x * 2);
        promise.complete(21);
        assert_eq!(future.wait(), 42);
    }

    #[test]
    fn test_wait_timeout() {
        let (promise, future) = Promise::new();
        let future = match future.wait_timeout(Duration::from_millis(10)) {
            Err(future) => future,
            Ok(_) => panic!("future should not be ready"),
        };

        promise.complete(7);
        assert_eq!(future.wait_timeout(Duration::from_secs(1)).ok(), Some(Ok(7)));
    }

    #[test]
    fn test_join_all() {
        let mut promises = vec![];
        let mut futures = vec![];

        for _ in 0..4 {
            let (p, f) = Promise::new();
            promises.push(p);
            futures.push(f);
        }

        let all = Future::join_all(futures);

        // Complete out of order.
        let mut promises = promises.into_iter().enumerate().collect::<Vec<_>>();
        promises.reverse();
        for (i, p) in promises {
            p.complete(i * 10);
        }

        assert_eq!(all.wait(), vec![0, 10, 20, 30]);
        assert_eq!(Future::<u8>::join_all(vec![]).wait(), Vec::<u8>::new());
    }

    #[test]
    fn test_join_all_poisoned() {
        let (p1, f1) = Promise::new();
        let (p2, f2) = Promise::<i32>::new();
        let all = Future::join_all(vec![f1, f2]);

        p1.complete(1);
        drop(p2);

        assert_eq!(all.wait_or_err(), Err(FutureError));
    }
}
