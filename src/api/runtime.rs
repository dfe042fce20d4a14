use crate::driver::Trace;
use crate::kernels::{self, reference, task, KernelError, ReferenceKernels, TaskKernels, VCyclePlan};
use crate::prelude::*;
use crate::profiling::{self, Category, ProfileReport};
use crate::types::{Coarsening, Config, Execution, Hierarchy, KernelPolicy, SparseMatrix, Vector};
use crate::worker::TaskPool;
use ghostflow_memops::RayonPolicy;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Result of a dot product.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DotProduct {
    pub result: f64,
    /// Time spent combining the partial sums.
    pub time_allreduce: Duration,
}

/// Kernel façade. Every call dispatches to either the sequential reference kernels or the
/// task-parallel kernels (according to [`KernelPolicy`]) and reports which one produced the
/// result.
#[derive(Debug)]
pub struct Runtime {
    config: Config,
    pool: TaskPool,
    trace: Option<Mutex<Trace>>,
    plan_traced: AtomicBool,
}

impl Runtime {
    pub fn new(config: Config) -> Result<Self> {
        // The sink is shared by the whole process. A runtime may switch it off, but only
        // `profiling::set_enabled` switches it back on.
        if !config.kernels.profiling {
            profiling::set_enabled(false);
        }

        let pool = TaskPool::new(&config.worker)?;
        let trace = match &config.trace_file {
            Some(path) => Some(Mutex::new(Trace::new(path)?)),
            None => None,
        };

        info!(
            "runtime started: {:?} kernels on {} threads",
            config.kernels.policy,
            pool.num_threads()
        );

        Ok(Self {
            config,
            pool,
            trace,
            plan_traced: AtomicBool::new(false),
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(Config::from_env())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn pool(&self) -> &TaskPool {
        &self.pool
    }

    pub fn is_optimized(&self) -> bool {
        self.config.kernels.policy == KernelPolicy::Optimized
    }

    /// Appends a record to the trace file, if one was configured.
    pub fn trace<T: serde::Serialize>(&self, kind: &str, data: &T) {
        if let Some(trace) = &self.trace {
            trace.lock().add(kind, data);
        }
    }

    /// Takes a snapshot of the profiling sink and appends it to the trace.
    pub fn trace_profile(&self) -> ProfileReport {
        let report = profiling::snapshot();
        self.trace("profile", &report);
        report
    }

    /// Runs `fun(optimized)`, inside the task pool if the optimized kernels are selected.
    fn dispatch<T, F>(&self, fun: F) -> Result<Execution<T>, KernelError>
    where
        T: Send,
        F: FnOnce(bool) -> Result<T, KernelError> + Send,
    {
        let optimized = self.is_optimized();
        trace!(
            "dispatching to {} kernel",
            if optimized { "optimized" } else { "reference" }
        );

        let value = if optimized {
            self.pool.install(|| fun(true))?
        } else {
            fun(false)?
        };

        Ok(Execution::new(value, optimized))
    }

    pub fn dot_product(
        &self,
        n: usize,
        x: &Vector,
        y: &Vector,
    ) -> Result<Execution<DotProduct>, KernelError> {
        let before = Instant::now();

        let execution = self.dispatch(|optimized| {
            if optimized {
                task::compute_dot_product(RayonPolicy, n, x, y)
            } else {
                reference::compute_dot_product_ref(n, x, y)
            }
        })?;

        // Single process: the local reduction is the global one.
        let time_allreduce = before.elapsed();
        profiling::record(Category::Allreduce, time_allreduce);

        Ok(execution.map(|result| DotProduct {
            result,
            time_allreduce,
        }))
    }

    pub fn spmv(&self, a: &SparseMatrix, x: &Vector, y: &mut Vector) -> Result<Execution, KernelError> {
        profiling::timed(Category::Spmv, || {
            self.dispatch(|optimized| {
                if optimized {
                    task::compute_spmv(RayonPolicy, a, x, y)
                } else {
                    reference::compute_spmv_ref(a, x, y)
                }
            })
        })
    }

    pub fn waxpby(
        &self,
        n: usize,
        alpha: f64,
        x: &Vector,
        beta: f64,
        y: &Vector,
        w: &mut Vector,
    ) -> Result<Execution, KernelError> {
        self.dispatch(|optimized| {
            if optimized {
                task::compute_waxpby(RayonPolicy, n, alpha, x, beta, y, w)
            } else {
                reference::compute_waxpby_ref(n, alpha, x, beta, y, w)
            }
        })
    }

    pub fn restriction(&self, c: &mut Coarsening, rf: &Vector) -> Result<Execution, KernelError> {
        self.dispatch(|optimized| {
            if optimized {
                task::compute_restriction(RayonPolicy, c, rf)
            } else {
                reference::compute_restriction_ref(c, rf)
            }
        })
    }

    pub fn prolongation(&self, c: &Coarsening, xf: &mut Vector) -> Result<Execution, KernelError> {
        self.dispatch(|optimized| {
            if optimized {
                task::compute_prolongation(RayonPolicy, c, xf)
            } else {
                reference::compute_prolongation_ref(c, xf)
            }
        })
    }

    /// One symmetric Gauss-Seidel sweep. There is no parallel implementation, so the result
    /// is never reported as optimized.
    pub fn symgs(&self, a: &SparseMatrix, r: &Vector, x: &mut Vector) -> Result<Execution, KernelError> {
        reference::compute_symgs_ref(a, r, x)?;
        Ok(Execution::new((), false))
    }

    /// Applies one V-cycle. The stage plan of the first call is written to the trace.
    pub fn mg(&self, hierarchy: &mut Hierarchy, r: &Vector, x: &mut Vector) -> Result<Execution, KernelError> {
        let plan = VCyclePlan::new(hierarchy);

        if !self.plan_traced.swap(true, Ordering::Relaxed) {
            self.trace("vcycle_plan", &plan);
        }

        profiling::timed(Category::Mg, || {
            self.dispatch(|optimized| {
                if optimized {
                    kernels::execute_plan(&TaskKernels, &plan, hierarchy, r, x)
                } else {
                    kernels::execute_plan(&ReferenceKernels, &plan, hierarchy, r, x)
                }
            })
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::halo::{pack, unpack, Direction};
    use crate::setup::generate_hierarchy;
    use crate::types::{Grid, KernelConfig, WorkerConfig};

    fn runtime(policy: KernelPolicy) -> Runtime {
        let mut config = Config::default();
        config.kernels = KernelConfig {
            policy,
            profiling: true,
        };
        config.worker = WorkerConfig {
            num_threads: Some(2),
        };

        Runtime::new(config).unwrap()
    }

    #[test]
    fn test_optimized_flag_is_truthful() {
        let x = Vector::from_fn(100, |i| i as f64);

        for &(policy, expected) in &[(KernelPolicy::Reference, false), (KernelPolicy::Optimized, true)] {
            let rt = runtime(policy);
            assert_eq!(rt.is_optimized(), expected);

            let e = rt.dot_product(100, &x, &x).unwrap();
            assert_eq!(e.optimized, expected);
            assert_eq!(e.value.result, (0..100).map(|i| (i * i) as f64).sum::<f64>());

            let mut y = Vector::zeros(100);
            let e = rt.spmv(&SparseMatrix::identity(100), &x, &mut y).unwrap();
            assert_eq!(e.optimized, expected);
            assert_eq!(x, y);

            let e = rt.symgs(&SparseMatrix::identity(100), &x, &mut y).unwrap();
            assert!(!e.optimized);
        }
    }

    #[test]
    fn test_preconditions_fail_before_execution() {
        let rt = runtime(KernelPolicy::Optimized);
        let x = Vector::zeros(10);
        let y = Vector::zeros(5);
        let mut w = Vector::filled(10, 3.0);

        let result = rt.waxpby(10, 1.0, &x, 1.0, &y, &mut w);
        assert!(matches!(result, Err(KernelError::LengthMismatch { .. })));
        assert_eq!(kernels::status(&result), 1);
        assert_eq!(w, Vector::filled(10, 3.0));
    }

    #[test]
    fn test_prolongation_updates_every_fine_point_once() {
        let rt = runtime(KernelPolicy::Optimized);
        let n = 200_000;

        assert!(matches!(
            Coarsening::new(vec![0; n], 1, n, 0, 0),
            Err(KernelError::InvalidCoarsening { .. })
        ));

        // Reversed injection, so neighbouring tasks touch distant fine points.
        let f2c = (0..n).rev().collect_vec();
        let mut c = Coarsening::new(f2c, n, n, 0, 0).unwrap();
        c.xc.fill(1.0);

        let mut xf = Vector::filled(n, 2.0);
        let e = rt.prolongation(&c, &mut xf).unwrap();
        assert!(e.optimized);
        assert_eq!(xf, Vector::filled(n, 3.0));
    }

    #[test]
    fn test_disabled_profiling_leaves_results_unchanged() {
        let mut grid = Grid::new(5, 4, 3);
        grid.fill_interior(|x, y, z| (x + 10 * y + 100 * z) as f64);

        let run = |rt: &Runtime| {
            let buffer = pack(Direction::East, &grid);
            let mut target = Grid::new(5, 4, 3);
            unpack(Direction::West, &mut target, buffer.clone());

            let x = Vector::from_fn(1000, |i| (i % 13) as f64);
            let dot = rt.dot_product(1000, &x, &x).unwrap().value.result;
            let mut y = Vector::zeros(1000);
            rt.spmv(&SparseMatrix::identity(1000), &x, &mut y).unwrap();

            (buffer, target, dot, y)
        };

        let mut config = Config::default();
        config.kernels.profiling = false;
        config.worker.num_threads = Some(2);
        let quiet = Runtime::new(config).unwrap();
        assert!(!profiling::is_enabled());

        let before = profiling::snapshot();
        let disabled = run(&quiet);
        let after = profiling::snapshot();
        profiling::set_enabled(true);

        for &category in &Category::ALL {
            assert_eq!(
                before.get(category).unwrap().samples,
                after.get(category).unwrap().samples,
                "{:?}",
                category
            );
        }

        let enabled = run(&runtime(KernelPolicy::Optimized));
        assert_eq!(disabled, enabled);

        let later = profiling::snapshot();
        for &category in &[Category::Pack, Category::PackX, Category::Unpack, Category::Allreduce, Category::Spmv] {
            assert!(later.get(category).unwrap().samples > after.get(category).unwrap().samples);
        }
    }

    #[test]
    fn test_zero_length_is_noop() {
        let rt = runtime(KernelPolicy::Optimized);
        let x = Vector::zeros(0);
        let mut w = Vector::zeros(0);

        let e = rt.dot_product(0, &x, &x).unwrap();
        assert_eq!(e.value.result, 0.0);
        rt.waxpby(0, 2.0, &x, 3.0, &x.clone(), &mut w).unwrap();
    }

    #[test]
    fn test_mg_paths_agree() {
        let problem = generate_hierarchy(8, 8, 8, 3, 1, 1).unwrap();
        let r = problem.b;

        let mut results = vec![];
        for &policy in &[KernelPolicy::Reference, KernelPolicy::Optimized] {
            let rt = runtime(policy);
            let mut h = problem.hierarchy.clone();
            let mut x = Vector::zeros(r.len());

            let e = rt.mg(&mut h, &r, &mut x).unwrap();
            assert_eq!(e.optimized, policy == KernelPolicy::Optimized);
            results.push(x);
        }

        for i in 0..r.len() {
            assert!((results[0][i] - results[1][i]).abs() <= 1e-12 * (1.0 + results[0][i].abs()));
        }
    }

    #[test]
    fn test_mg_plan_is_traced_once() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut config = Config::reference();
        config.trace_file = Some(file.path().to_path_buf());
        let rt = Runtime::new(config).unwrap();

        let mut h = Hierarchy::single(SparseMatrix::identity(4));
        let r = Vector::filled(4, 2.0);
        let mut x = Vector::zeros(4);

        rt.mg(&mut h, &r, &mut x).unwrap();
        rt.mg(&mut h, &r, &mut x).unwrap();
        assert_eq!(x, r);

        let content = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.contains("vcycle_plan"));
    }
}
