//! Multigrid V-cycle.
//!
//! A V-cycle over a [`Hierarchy`] is first lowered into a [`VCyclePlan`]: a chain of stages in
//! which every stage depends on its predecessor. The executor walks this chain, handing each
//! stage to a [`MultigridKernels`] implementation, and stops at the first stage that fails.
use super::{check_length, reference, task, KernelError};
use crate::prelude::*;
use crate::types::{Coarsening, Hierarchy, Level, SparseMatrix, Vector};
use ghostflow_memops::RayonPolicy;
use serde::Serialize;

/// The operations a V-cycle is composed of.
pub trait MultigridKernels: Sync {
    /// `true` if these kernels are the task-parallel implementation.
    fn is_optimized(&self) -> bool;

    /// One smoother application on `A·x = r`.
    fn smooth(&self, a: &SparseMatrix, r: &Vector, x: &mut Vector) -> Result<(), KernelError>;

    /// `y = A·x`.
    fn spmv(&self, a: &SparseMatrix, x: &Vector, y: &mut Vector) -> Result<(), KernelError>;

    /// Computes the coarse residual of `c` from the fine residual `rf`.
    fn restrict(&self, c: &mut Coarsening, rf: &Vector) -> Result<(), KernelError>;

    /// Adds the coarse correction of `c` to `xf`.
    fn prolong(&self, c: &Coarsening, xf: &mut Vector) -> Result<(), KernelError>;
}

/// Strictly sequential kernels.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReferenceKernels;

impl MultigridKernels for ReferenceKernels {
    fn is_optimized(&self) -> bool {
        false
    }

    fn smooth(&self, a: &SparseMatrix, r: &Vector, x: &mut Vector) -> Result<(), KernelError> {
        reference::compute_symgs_ref(a, r, x)
    }

    fn spmv(&self, a: &SparseMatrix, x: &Vector, y: &mut Vector) -> Result<(), KernelError> {
        reference::compute_spmv_ref(a, x, y)
    }

    fn restrict(&self, c: &mut Coarsening, rf: &Vector) -> Result<(), KernelError> {
        reference::compute_restriction_ref(c, rf)
    }

    fn prolong(&self, c: &Coarsening, xf: &mut Vector) -> Result<(), KernelError> {
        reference::compute_prolongation_ref(c, xf)
    }
}

/// Task-parallel kernels. The symmetric Gauss-Seidel smoother carries a dependency from every
/// row to the next and therefore always runs the reference sweep.
#[derive(Debug, Default, Clone, Copy)]
pub struct TaskKernels;

impl MultigridKernels for TaskKernels {
    fn is_optimized(&self) -> bool {
        true
    }

    fn smooth(&self, a: &SparseMatrix, r: &Vector, x: &mut Vector) -> Result<(), KernelError> {
        reference::compute_symgs_ref(a, r, x)
    }

    fn spmv(&self, a: &SparseMatrix, x: &Vector, y: &mut Vector) -> Result<(), KernelError> {
        task::compute_spmv(RayonPolicy, a, x, y)
    }

    fn restrict(&self, c: &mut Coarsening, rf: &Vector) -> Result<(), KernelError> {
        task::compute_restriction(RayonPolicy, c, rf)
    }

    fn prolong(&self, c: &Coarsening, xf: &mut Vector) -> Result<(), KernelError> {
        task::compute_prolongation(RayonPolicy, c, xf)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Sweep {
    Pre,
    Post,
    Coarsest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageKind {
    /// `x = 0`
    Zero,
    /// Smoother application number `step` of `sweep`.
    Smooth { sweep: Sweep, step: usize },
    /// `Axf = A·x`
    Spmv,
    /// `rc = (r - Axf)[f2c]`
    Restrict,
    /// `x[f2c] += xc`
    Prolong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stage {
    pub level: usize,
    #[serde(flatten)]
    pub kind: StageKind,
}

/// Linear chain of stages of one V-cycle. Stage `i + 1` may only start once stage `i` has
/// completed successfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VCyclePlan {
    num_levels: usize,
    stages: Vec<Stage>,
}

impl VCyclePlan {
    pub fn new(hierarchy: &Hierarchy) -> Self {
        let mut stages = vec![];
        Self::lower(hierarchy.levels(), 0, &mut stages);

        Self {
            num_levels: hierarchy.num_levels(),
            stages,
        }
    }

    fn lower(levels: &[Level], level: usize, stages: &mut Vec<Stage>) {
        use StageKind::*;
        let push = |stages: &mut Vec<Stage>, kind: StageKind| stages.push(Stage { level, kind });

        push(stages, Zero);

        let c = match &levels[level].coarsening {
            Some(c) => c,
            None => {
                push(
                    stages,
                    Smooth {
                        sweep: Sweep::Coarsest,
                        step: 0,
                    },
                );
                return;
            }
        };

        for step in 0..c.pre_smoother_steps {
            push(
                stages,
                Smooth {
                    sweep: Sweep::Pre,
                    step,
                },
            );
        }

        push(stages, Spmv);
        push(stages, Restrict);

        Self::lower(levels, level + 1, stages);

        push(stages, Prolong);

        for step in 0..c.post_smoother_steps {
            push(
                stages,
                Smooth {
                    sweep: Sweep::Post,
                    step,
                },
            );
        }
    }

    pub fn num_levels(&self) -> usize {
        self.num_levels
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn count(&self, pred: impl Fn(&StageKind) -> bool) -> usize {
        self.stages.iter().filter(|s| pred(&s.kind)).count()
    }
}

/// The operands of one level: its matrix, its transfer data (if not the coarsest), and the
/// right-hand side and solution it works on.
struct LevelView<'a> {
    matrix: &'a SparseMatrix,
    coarsening: Option<&'a mut Coarsening>,
    r: &'a Vector,
    x: &'a mut Vector,
}

/// Level 0 works on the caller's `r` and `x`, level `l > 0` on the coarse residual and
/// solution stored in the transfer data of level `l - 1`.
fn level_view<'a>(
    levels: &'a mut [Level],
    level: usize,
    r: &'a Vector,
    x: &'a mut Vector,
) -> Result<LevelView<'a>, KernelError> {
    let (finer, rest) = levels.split_at_mut(level);
    let current = &mut rest[0];

    let (r, x) = match finer.last_mut() {
        None => (r, x),
        Some(parent) => match &mut parent.coarsening {
            Some(c) => (&c.rc, &mut c.xc),
            None => {
                return Err(KernelError::MalformedHierarchy {
                    level: level - 1,
                    reason: "missing coarsening data".into(),
                })
            }
        },
    };

    Ok(LevelView {
        matrix: &current.matrix,
        coarsening: current.coarsening.as_mut(),
        r,
        x,
    })
}

fn execute_stage<K: MultigridKernels + ?Sized>(
    kernels: &K,
    stage: &Stage,
    view: LevelView<'_>,
) -> Result<(), KernelError> {
    use StageKind::*;
    let LevelView {
        matrix,
        coarsening,
        r,
        x,
    } = view;

    let missing = || KernelError::MalformedHierarchy {
        level: stage.level,
        reason: "missing coarsening data".into(),
    };

    match stage.kind {
        Zero => {
            x.zero();
            Ok(())
        }
        Smooth { .. } => kernels.smooth(matrix, r, x),
        Spmv => {
            let c = coarsening.ok_or_else(missing)?;
            kernels.spmv(matrix, x, &mut c.axf)
        }
        Restrict => {
            let c = coarsening.ok_or_else(missing)?;
            kernels.restrict(c, r)
        }
        Prolong => {
            let c = coarsening.ok_or_else(missing)?;
            kernels.prolong(c, x)
        }
    }
}

/// Applies one V-cycle of `hierarchy` to the residual `r`, writing the result into `x`.
///
/// Execution stops at the first failing stage and returns its error; the remaining stages
/// are not executed and `x` is left in an unspecified state.
pub fn compute_mg<K: MultigridKernels + ?Sized>(
    kernels: &K,
    hierarchy: &mut Hierarchy,
    r: &Vector,
    x: &mut Vector,
) -> Result<(), KernelError> {
    let plan = VCyclePlan::new(hierarchy);
    execute_plan(kernels, &plan, hierarchy, r, x)
}

/// Executes a previously lowered `plan`, which must have been created for `hierarchy`.
pub fn execute_plan<K: MultigridKernels + ?Sized>(
    kernels: &K,
    plan: &VCyclePlan,
    hierarchy: &mut Hierarchy,
    r: &Vector,
    x: &mut Vector,
) -> Result<(), KernelError> {
    if plan.num_levels() != hierarchy.num_levels() {
        return Err(KernelError::MalformedHierarchy {
            level: 0,
            reason: format!(
                "plan has {} levels but the hierarchy has {}",
                plan.num_levels(),
                hierarchy.num_levels()
            ),
        });
    }

    let finest = hierarchy.finest();
    check_length("mg r", r, finest.local_number_of_rows())?;
    check_length("mg x", x, finest.local_number_of_columns())?;

    let levels = hierarchy.levels_mut();

    for stage in plan.stages() {
        let view = level_view(levels, stage.level, r, x)?;

        if let Err(e) = execute_stage(kernels, stage, view) {
            debug!("V-cycle aborted at {:?}: {}", stage, e);
            return Err(e);
        }
    }

    Ok(())
}

/// V-cycle using only the sequential reference kernels.
pub fn compute_mg_ref(hierarchy: &mut Hierarchy, r: &Vector, x: &mut Vector) -> Result<(), KernelError> {
    compute_mg(&ReferenceKernels, hierarchy, r, x)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Identity smoother (no-op) and reference transfer kernels, counting every call.
    #[derive(Default)]
    struct CountingKernels {
        smooth: AtomicUsize,
        spmv: AtomicUsize,
        restrict: AtomicUsize,
        prolong: AtomicUsize,
        fail_smooth_at: Option<usize>,
        restricted: Mutex<Vec<Vec<f64>>>,
    }

    impl CountingKernels {
        fn get(counter: &AtomicUsize) -> usize {
            counter.load(Ordering::SeqCst)
        }
    }

    impl MultigridKernels for CountingKernels {
        fn is_optimized(&self) -> bool {
            false
        }

        fn smooth(&self, _a: &SparseMatrix, _r: &Vector, _x: &mut Vector) -> Result<(), KernelError> {
            let index = self.smooth.fetch_add(1, Ordering::SeqCst);

            if self.fail_smooth_at == Some(index) {
                return Err(KernelError::Failed {
                    kernel: "smooth",
                    code: 42,
                });
            }

            Ok(())
        }

        fn spmv(&self, a: &SparseMatrix, x: &Vector, y: &mut Vector) -> Result<(), KernelError> {
            self.spmv.fetch_add(1, Ordering::SeqCst);
            reference::compute_spmv_ref(a, x, y)
        }

        fn restrict(&self, c: &mut Coarsening, rf: &Vector) -> Result<(), KernelError> {
            self.restrict.fetch_add(1, Ordering::SeqCst);
            reference::compute_restriction_ref(c, rf)?;
            self.restricted.lock().push(c.coarse_residual().values().to_vec());
            Ok(())
        }

        fn prolong(&self, c: &Coarsening, xf: &mut Vector) -> Result<(), KernelError> {
            self.prolong.fetch_add(1, Ordering::SeqCst);
            reference::compute_prolongation_ref(c, xf)
        }
    }

    /// Halving hierarchy with identity matrices: level `l` has `n >> l` rows and injects the
    /// even fine points.
    fn identity_hierarchy(n: usize, levels: usize, pre: usize, post: usize) -> Hierarchy {
        let mut result = vec![];

        for l in 0..levels {
            let rows = n >> l;
            let coarsening = if l + 1 < levels {
                let f2c = (0..rows / 2).map(|i| 2 * i).collect();
                Some(Coarsening::new(f2c, rows, rows / 2, pre, post).unwrap())
            } else {
                None
            };

            result.push(Level::new(SparseMatrix::identity(rows), coarsening));
        }

        Hierarchy::new(result).unwrap()
    }

    #[test]
    fn test_single_level_is_one_smoother_call() {
        let mut h = identity_hierarchy(8, 1, 0, 0);
        let kernels = CountingKernels::default();
        let r = Vector::filled(8, 1.0);
        let mut x = Vector::filled(8, 5.0);

        compute_mg(&kernels, &mut h, &r, &mut x).unwrap();

        assert_eq!(CountingKernels::get(&kernels.smooth), 1);
        assert_eq!(CountingKernels::get(&kernels.spmv), 0);
        assert_eq!(x, Vector::zeros(8));
    }

    #[test]
    fn test_spmv_calls_per_level() {
        for levels in 1..=4 {
            let mut h = identity_hierarchy(16, levels, 0, 0);
            let kernels = CountingKernels::default();
            let r = Vector::filled(16, 1.0);
            let mut x = Vector::zeros(16);

            compute_mg(&kernels, &mut h, &r, &mut x).unwrap();

            assert_eq!(CountingKernels::get(&kernels.spmv), levels - 1);
            assert_eq!(CountingKernels::get(&kernels.restrict), levels - 1);
            assert_eq!(CountingKernels::get(&kernels.prolong), levels - 1);
            assert_eq!(CountingKernels::get(&kernels.smooth), 1);
        }
    }

    #[test]
    fn test_three_level_scenario() {
        let mut h = identity_hierarchy(8, 3, 1, 1);
        assert_eq!(h.level(0).coarsening.as_ref().unwrap().f2c(), &[0, 2, 4, 6]);

        let kernels = CountingKernels::default();
        let r = Vector::from(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        let mut x = Vector::zeros(8);

        compute_mg(&kernels, &mut h, &r, &mut x).unwrap();

        let restricted = kernels.restricted.lock();
        assert_eq!(restricted[0], vec![1.0, 3.0, 5.0, 7.0]);
        assert_eq!(restricted[1], vec![1.0, 5.0]);

        // Two sweeps on each non-coarsest level plus one on the coarsest.
        assert_eq!(CountingKernels::get(&kernels.smooth), 5);

        // The coarsest solution is zero (no-op smoother), so nothing is prolongated.
        assert_eq!(x, Vector::zeros(8));
    }

    #[test]
    fn test_plan_order() {
        use StageKind::*;
        let h = identity_hierarchy(8, 2, 1, 2);
        let plan = VCyclePlan::new(&h);

        let kinds = plan.stages().iter().map(|s| (s.level, s.kind)).collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![
                (0, Zero),
                (0, Smooth { sweep: Sweep::Pre, step: 0 }),
                (0, Spmv),
                (0, Restrict),
                (1, Zero),
                (1, Smooth { sweep: Sweep::Coarsest, step: 0 }),
                (0, Prolong),
                (0, Smooth { sweep: Sweep::Post, step: 0 }),
                (0, Smooth { sweep: Sweep::Post, step: 1 }),
            ]
        );

        assert_eq!(plan.count(|k| matches!(k, Spmv)), 1);

        let json = serde_json::to_string(&plan).unwrap();
        assert!(json.contains("\"kind\":\"restrict\""));
    }

    #[test]
    fn test_failure_short_circuits() {
        let mut h = identity_hierarchy(8, 3, 1, 1);
        let kernels = CountingKernels {
            fail_smooth_at: Some(0),
            ..default()
        };

        let r = Vector::filled(8, 1.0);
        let mut x = Vector::zeros(8);
        let result = compute_mg(&kernels, &mut h, &r, &mut x);

        assert_eq!(
            result,
            Err(KernelError::Failed {
                kernel: "smooth",
                code: 42
            })
        );
        assert_eq!(super::super::status(&result), 42);
        assert_eq!(CountingKernels::get(&kernels.smooth), 1);
        assert_eq!(CountingKernels::get(&kernels.spmv), 0);
        assert_eq!(CountingKernels::get(&kernels.prolong), 0);
    }

    #[test]
    fn test_length_checked_before_any_stage() {
        let mut h = identity_hierarchy(8, 2, 1, 1);
        let kernels = CountingKernels::default();
        let r = Vector::zeros(4);
        let mut x = Vector::zeros(8);

        let result = compute_mg(&kernels, &mut h, &r, &mut x);
        assert!(matches!(result, Err(KernelError::LengthMismatch { .. })));
        assert_eq!(CountingKernels::get(&kernels.smooth), 0);
    }

    #[test]
    fn test_reference_and_task_kernels_agree() {
        let problem = crate::setup::generate_hierarchy(8, 8, 8, 3, 1, 1).unwrap();
        let mut h1 = problem.hierarchy.clone();
        let mut h2 = problem.hierarchy;

        let r = problem.b;
        let mut x1 = Vector::zeros(r.len());
        let mut x2 = Vector::zeros(r.len());

        compute_mg_ref(&mut h1, &r, &mut x1).unwrap();
        compute_mg(&TaskKernels, &mut h2, &r, &mut x2).unwrap();

        for i in 0..r.len() {
            assert!((x1[i] - x2[i]).abs() <= 1e-12 * (1.0 + x1[i].abs()));
        }
    }
}
