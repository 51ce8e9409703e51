//! Dense Levenberg–Marquardt solver on `nalgebra`.
//!
//! Problems expose a residual vector and optionally an analytic Jacobian;
//! the default Jacobian uses central differences. Parameters can be held
//! fixed, which zeroes their Jacobian columns and freezes their updates.

use log::debug;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// A nonlinear least-squares problem `min 0.5 * ||r(x)||²`.
pub trait LeastSquaresProblem {
    /// Residual vector at `params`.
    fn residuals(&self, params: &DVector<f64>) -> DVector<f64>;

    /// Whether parameter `index` is held constant.
    fn is_fixed(&self, _index: usize) -> bool {
        false
    }

    /// Jacobian of the residuals, `m x n`.
    fn jacobian(&self, params: &DVector<f64>) -> DMatrix<f64> {
        numeric_jacobian(|p| self.residuals(p), params, |i| self.is_fixed(i))
    }
}

/// Central-difference Jacobian. Columns of fixed parameters stay zero.
pub fn numeric_jacobian(
    f: impl Fn(&DVector<f64>) -> DVector<f64>,
    params: &DVector<f64>,
    is_fixed: impl Fn(usize) -> bool,
) -> DMatrix<f64> {
    let r0 = f(params);
    let mut jac = DMatrix::<f64>::zeros(r0.len(), params.len());
    let mut x = params.clone();
    for j in 0..params.len() {
        if is_fixed(j) {
            continue;
        }
        let h = 1e-6 * params[j].abs().max(1.0);
        let orig = x[j];
        x[j] = orig + h;
        let rp = f(&x);
        x[j] = orig - h;
        let rm = f(&x);
        x[j] = orig;
        jac.set_column(j, &((rp - rm) / (2.0 * h)));
    }
    jac
}

/// Stopping criteria.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolveOptions {
    pub max_iters: usize,
    /// Relative cost decrease below which the solve is converged.
    pub ftol: f64,
    /// Relative step size below which the solve is converged.
    pub xtol: f64,
    /// Max-norm of the gradient below which the solve is converged.
    pub gtol: f64,
    pub initial_lambda: f64,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            max_iters: 100,
            ftol: 1e-12,
            xtol: 1e-12,
            gtol: 1e-10,
            initial_lambda: 1e-3,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    CostTolerance,
    StepTolerance,
    GradientTolerance,
    /// Damping grew without finding a cost decrease.
    Stalled,
    MaxIterations,
    /// Residuals became non-finite.
    NonFinite,
}

/// Outcome of a solve.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolveReport {
    pub iterations: usize,
    pub initial_cost: f64,
    pub final_cost: f64,
    pub termination: Termination,
}

impl SolveReport {
    pub fn converged(&self) -> bool {
        matches!(
            self.termination,
            Termination::CostTolerance
                | Termination::StepTolerance
                | Termination::GradientTolerance
                | Termination::Stalled
        )
    }
}

fn cost(r: &DVector<f64>) -> f64 {
    0.5 * r.norm_squared()
}

/// Minimize `problem` starting from `x0`. Returns the best parameters found.
pub fn solve<P: LeastSquaresProblem + ?Sized>(
    problem: &P,
    x0: DVector<f64>,
    opts: &SolveOptions,
) -> (DVector<f64>, SolveReport) {
    let n = x0.len();
    let mut x = x0;
    let mut r = problem.residuals(&x);
    let initial_cost = cost(&r);
    let mut current = initial_cost;
    let mut lambda = opts.initial_lambda;

    let report = |iterations, final_cost, termination| SolveReport {
        iterations,
        initial_cost,
        final_cost,
        termination,
    };

    if !current.is_finite() {
        return (x, report(0, current, Termination::NonFinite));
    }

    for iter in 0..opts.max_iters {
        let mut jac = problem.jacobian(&x);
        for j in (0..n).filter(|&j| problem.is_fixed(j)) {
            jac.column_mut(j).fill(0.0);
        }
        let g = jac.tr_mul(&r);
        if g.amax() < opts.gtol {
            return (x, report(iter, current, Termination::GradientTolerance));
        }
        let h = jac.tr_mul(&jac);

        let mut accepted = false;
        while lambda < 1e16 {
            let mut a = h.clone();
            for i in 0..n {
                if problem.is_fixed(i) {
                    a.row_mut(i).fill(0.0);
                    a.column_mut(i).fill(0.0);
                    a[(i, i)] = 1.0;
                } else {
                    a[(i, i)] += lambda * h[(i, i)].max(1e-12);
                }
            }

            let rhs = -g.clone();
            let step = match a.clone().cholesky() {
                Some(chol) => Some(chol.solve(&rhs)),
                None => a.lu().solve(&rhs),
            };
            let Some(step) = step else {
                lambda *= 10.0;
                continue;
            };

            let x_new = &x + &step;
            let r_new = problem.residuals(&x_new);
            let new_cost = cost(&r_new);

            if new_cost.is_finite() && new_cost < current {
                let decrease = current - new_cost;
                let small_step = step.norm() <= opts.xtol * (x.norm() + opts.xtol);
                x = x_new;
                r = r_new;
                current = new_cost;
                lambda = (lambda / 10.0).max(1e-15);
                accepted = true;
                debug!("lm iter {iter}: cost {current:.6e}, lambda {lambda:.1e}");

                if decrease <= opts.ftol * (current + decrease) {
                    return (x, report(iter + 1, current, Termination::CostTolerance));
                }
                if small_step {
                    return (x, report(iter + 1, current, Termination::StepTolerance));
                }
                break;
            }
            lambda *= 10.0;
        }

        if !accepted {
            return (x, report(iter, current, Termination::Stalled));
        }
    }

    (x, report(opts.max_iters, current, Termination::MaxIterations))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Fit `y = a * exp(b * t)`.
    struct ExpFit {
        t: Vec<f64>,
        y: Vec<f64>,
    }

    impl LeastSquaresProblem for ExpFit {
        fn residuals(&self, p: &DVector<f64>) -> DVector<f64> {
            DVector::from_iterator(
                self.t.len(),
                self.t
                    .iter()
                    .zip(&self.y)
                    .map(|(t, y)| p[0] * (p[1] * t).exp() - y),
            )
        }
    }

    struct Rosenbrock {
        fix_y: bool,
    }

    impl LeastSquaresProblem for Rosenbrock {
        fn residuals(&self, p: &DVector<f64>) -> DVector<f64> {
            DVector::from_vec(vec![1.0 - p[0], 10.0 * (p[1] - p[0] * p[0])])
        }

        fn is_fixed(&self, index: usize) -> bool {
            self.fix_y && index == 1
        }
    }

    #[test]
    fn fits_exponential_curve() {
        let t: Vec<f64> = (0..20).map(|i| i as f64 * 0.1).collect();
        let y = t.iter().map(|t| 2.5 * (-1.3 * t).exp()).collect();
        let problem = ExpFit { t, y };
        let (x, report) = solve(&problem, DVector::from_vec(vec![1.0, 0.0]), &SolveOptions::default());
        assert!(report.converged(), "{report:?}");
        assert!(report.final_cost < 1e-14);
        assert_relative_eq!(x[0], 2.5, epsilon = 1e-6);
        assert_relative_eq!(x[1], -1.3, epsilon = 1e-6);
    }

    #[test]
    fn solves_rosenbrock() {
        let (x, report) = solve(
            &Rosenbrock { fix_y: false },
            DVector::from_vec(vec![-1.2, 1.0]),
            &SolveOptions::default(),
        );
        assert!(report.converged(), "{report:?}");
        assert_relative_eq!(x[0], 1.0, epsilon = 1e-6);
        assert_relative_eq!(x[1], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn fixed_parameters_do_not_move() {
        let (x, _) = solve(
            &Rosenbrock { fix_y: true },
            DVector::from_vec(vec![0.0, 0.25]),
            &SolveOptions::default(),
        );
        assert_eq!(x[1], 0.25);
        // With y fixed the best x satisfies the stationarity of the 1-D problem.
        assert!(x[0] > 0.0 && x[0] < 1.0);
    }

    #[test]
    fn numeric_jacobian_matches_analytic() {
        let problem = Rosenbrock { fix_y: false };
        let p = DVector::from_vec(vec![0.3, -0.7]);
        let j = problem.jacobian(&p);
        assert_relative_eq!(j[(0, 0)], -1.0, epsilon = 1e-8);
        assert_relative_eq!(j[(1, 0)], -20.0 * 0.3, epsilon = 1e-6);
        assert_relative_eq!(j[(1, 1)], 10.0, epsilon = 1e-8);
    }
}
