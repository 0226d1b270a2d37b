use log::{debug, warn};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use crate::{
    data::SurvivalData,
    error::{Result, SurvivalError},
};

/// Pivots below this are treated as zero when solving / inverting
const SINGULAR_PIVOT: f64 = 1e-12;

/// A likelihood plateau only counts as convergence once the newton step is this small
const PLATEAU_STEP: f64 = 1e-3;

/// How tied event times enter the partial likelihood
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TieMethod {
    /// Efron's approximation - the l-th of d tied events sees the risk set
    /// minus l/d of the tied set
    #[default]
    Efron,
    /// Breslow's approximation - every tied event sees the full risk set
    Breslow,
}

/// Configuration for the Newton-Raphson fit
#[derive(Debug, Clone)]
pub struct OptimizationConfig {
    pub max_iterations: usize,
    /// Stop once the euclidean norm of the full newton step drops below this
    pub tolerance: f64,
    /// Stop once the log-likelihood changes by less than this
    pub likelihood_tolerance: f64,
    /// How many times a step may be halved when it lowers the likelihood
    pub max_step_halvings: usize,
    pub ties: TieMethod,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            tolerance: 1e-6,
            likelihood_tolerance: 1e-10,
            max_step_halvings: 20,
            ties: TieMethod::Efron,
        }
    }
}

impl OptimizationConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(SurvivalError::invalid_parameter("max_iterations", "0"));
        }
        if !(self.tolerance > 0.0 && self.tolerance.is_finite()) {
            return Err(SurvivalError::invalid_parameter("tolerance", self.tolerance.to_string()));
        }
        if !(self.likelihood_tolerance >= 0.0 && self.likelihood_tolerance.is_finite()) {
            return Err(SurvivalError::invalid_parameter(
                "likelihood_tolerance",
                self.likelihood_tolerance.to_string(),
            ));
        }
        Ok(())
    }
}

/// Records sharing one observed time, walked from the latest time backwards
#[derive(Debug, Clone)]
pub(crate) struct TimeGroup {
    pub time: f64,
    pub members: Vec<usize>,
    pub events: Vec<usize>,
}

/// Precomputed risk-set structure for a dataset.
///
/// Walking the groups in descending time and accumulating every member seen
/// so far yields exactly the risk set `{j : t_j >= t}` at each time.
#[derive(Debug, Clone)]
pub(crate) struct RiskSetLayout {
    groups: Vec<TimeGroup>,
    n_events: usize,
}

impl RiskSetLayout {
    pub(crate) fn new(data: &SurvivalData) -> Self {
        let times = data.times();
        let events = data.events();
        let mut groups: Vec<TimeGroup> = Vec::new();

        for &i in data.sorted_order().iter().rev() {
            let t = times[i];
            match groups.last_mut() {
                Some(group) if group.time == t => group.members.push(i),
                _ => groups.push(TimeGroup { time: t, members: vec![i], events: Vec::new() }),
            }
            if events[i] {
                if let Some(group) = groups.last_mut() {
                    group.events.push(i);
                }
            }
        }

        Self {
            groups,
            n_events: data.n_events(),
        }
    }

    pub(crate) fn n_events(&self) -> usize {
        self.n_events
    }

    /// Groups holding at least one event, latest time first
    #[cfg(test)]
    pub(crate) fn event_groups(&self) -> impl Iterator<Item = &TimeGroup> {
        self.groups.iter().filter(|g| !g.events.is_empty())
    }
}

/// Running weighted sums over a set of records.
///
/// Weights are stored relative to `shift`, the largest linear predictor
/// added so far, so the sums stay finite and the largest weight is exactly 1
/// however far apart the linear predictors drift.
#[derive(Debug, Clone)]
struct WeightedSums {
    shift: f64,
    s0: f64,
    s1: Array1<f64>,
    s2: Array2<f64>,
}

impl WeightedSums {
    fn new(n_features: usize) -> Self {
        Self {
            shift: f64::NEG_INFINITY,
            s0: 0.0,
            s1: Array1::zeros(n_features),
            s2: Array2::zeros((n_features, n_features)),
        }
    }

    /// add a record with linear predictor `eta`, re-basing on a new maximum
    fn push(&mut self, eta: f64, x: ArrayView1<f64>) {
        if eta > self.shift {
            if self.s0 > 0.0 {
                let rescale = (self.shift - eta).exp();
                self.s0 *= rescale;
                self.s1 *= rescale;
                self.s2 *= rescale;
            }
            self.shift = eta;
        }
        self.add((eta - self.shift).exp(), x);
    }

    /// add with a weight already relative to some shared shift
    fn add(&mut self, weight: f64, x: ArrayView1<f64>) {
        let n_features = x.len();
        self.s0 += weight;
        for j in 0..n_features {
            let wx = weight * x[j];
            self.s1[j] += wx;
            for k in 0..n_features {
                self.s2[[j, k]] += wx * x[k];
            }
        }
    }
}

/// Linear predictors `x.beta`, all finite
fn linear_predictors(x: ArrayView2<f64>, beta: &Array1<f64>) -> Result<Array1<f64>> {
    let eta = x.dot(beta);
    if eta.iter().any(|e| !e.is_finite()) {
        return Err(SurvivalError::numerical_error("non-finite linear predictor"));
    }
    Ok(eta)
}

/// Sums over a tied event set, on the same shift as the risk set holding it
fn tied_sums(
    x: ArrayView2<f64>,
    eta: &Array1<f64>,
    events: &[usize],
    risk: &WeightedSums,
) -> WeightedSums {
    let mut tied = WeightedSums::new(x.ncols());
    tied.shift = risk.shift;
    for &i in events {
        tied.add((eta[i] - risk.shift).exp(), x.row(i));
    }
    tied
}

/// Log partial likelihood with its gradient and Hessian
#[derive(Debug, Clone)]
pub struct LikelihoodDerivatives {
    pub log_likelihood: f64,
    pub gradient: Array1<f64>,
    pub hessian: Array2<f64>,
}

/// Compute log partial likelihood and its derivatives
pub(crate) fn compute_likelihood_derivatives(
    x: ArrayView2<f64>,
    beta: &Array1<f64>,
    layout: &RiskSetLayout,
    ties: TieMethod,
) -> Result<LikelihoodDerivatives> {
    let n_features = x.ncols();
    let eta = linear_predictors(x, beta)?;

    let mut loglik = 0.0;
    let mut gradient = Array1::zeros(n_features);
    let mut hessian = Array2::zeros((n_features, n_features));
    let mut risk = WeightedSums::new(n_features);

    for group in &layout.groups {
        for &i in &group.members {
            risk.push(eta[i], x.row(i));
        }

        if group.events.is_empty() {
            continue;
        }

        let tied = tied_sums(x, &eta, &group.events, &risk);
        for &i in &group.events {
            loglik += eta[i];
            gradient += &x.row(i);
        }

        let d = group.events.len() as f64;
        for l in 0..group.events.len() {
            let fraction = match ties {
                TieMethod::Efron => l as f64 / d,
                TieMethod::Breslow => 0.0,
            };

            let phi = risk.s0 - fraction * tied.s0;
            if !(phi > 0.0 && phi.is_finite()) {
                return Err(SurvivalError::numerical_error(
                    format!("risk set sum is not positive at time {}", group.time)
                ));
            }

            let mean = (&risk.s1 - &(fraction * &tied.s1)) / phi;
            loglik -= phi.ln() + risk.shift;
            gradient -= &mean;

            for j in 0..n_features {
                for k in 0..n_features {
                    let second = (risk.s2[[j, k]] - fraction * tied.s2[[j, k]]) / phi;
                    hessian[[j, k]] -= second - mean[j] * mean[k];
                }
            }
        }
    }

    Ok(LikelihoodDerivatives {
        log_likelihood: loglik,
        gradient,
        hessian,
    })
}

/// Weighted covariate mean expected for each event under `beta`.
///
/// Returns `(event record, expected covariates)` pairs in ascending time.
/// With Efron ties every event of a tied group gets the average of the d
/// Efron-adjusted means.
pub(crate) fn expected_event_covariates(
    x: ArrayView2<f64>,
    beta: &Array1<f64>,
    layout: &RiskSetLayout,
    ties: TieMethod,
) -> Result<Vec<(usize, Array1<f64>)>> {
    let n_features = x.ncols();
    let eta = linear_predictors(x, beta)?;

    let mut risk = WeightedSums::new(n_features);
    let mut expected = Vec::with_capacity(layout.n_events());

    for group in &layout.groups {
        for &i in &group.members {
            risk.push(eta[i], x.row(i));
        }

        if group.events.is_empty() {
            continue;
        }

        let tied = tied_sums(x, &eta, &group.events, &risk);

        let d = group.events.len() as f64;
        let mut mean: Array1<f64> = Array1::zeros(n_features);
        for l in 0..group.events.len() {
            let fraction = match ties {
                TieMethod::Efron => l as f64 / d,
                TieMethod::Breslow => 0.0,
            };
            let phi = risk.s0 - fraction * tied.s0;
            if !(phi > 0.0 && phi.is_finite()) {
                return Err(SurvivalError::numerical_error(
                    format!("risk set sum is not positive at time {}", group.time)
                ));
            }
            mean += &((&risk.s1 - &(fraction * &tied.s1)) / (phi * d));
        }

        // groups come latest-first, flipped below
        for &i in &group.events {
            expected.push((i, mean.clone()));
        }
    }

    expected.reverse();
    Ok(expected)
}

/// What the Newton-Raphson loop ended with
#[derive(Debug, Clone)]
pub struct OptimizationOutcome {
    pub beta: Array1<f64>,
    pub log_likelihood: f64,
    pub null_log_likelihood: f64,
    /// Hessian of the log partial likelihood at `beta`
    pub hessian: Array2<f64>,
    pub iterations: usize,
    pub converged: bool,
}

/// Newton-Raphson maximizer of the Cox partial likelihood
#[derive(Debug, Clone)]
pub struct CoxOptimizer {
    config: OptimizationConfig,
}

impl CoxOptimizer {
    pub fn new(config: OptimizationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OptimizationConfig {
        &self.config
    }

    /// Maximize the partial likelihood of `data`'s risk sets over covariates `x`.
    ///
    /// `x` may be a transformed (e.g. standardized) copy of the data's
    /// covariates; rows must line up with the data's records.
    pub fn optimize(&self, x: ArrayView2<f64>, data: &SurvivalData) -> Result<OptimizationOutcome> {
        self.config.validate()?;

        if x.nrows() != data.n_samples() {
            return Err(SurvivalError::invalid_dimensions(format!(
                "covariate rows ({}) != n_samples ({})",
                x.nrows(),
                data.n_samples()
            )));
        }

        let layout = RiskSetLayout::new(data);
        if layout.n_events() == 0 {
            return Err(SurvivalError::insufficient_data(
                "cox regression needs at least one observed event"
            ));
        }

        self.newton_raphson(x, &layout)
    }

    pub(crate) fn newton_raphson(
        &self,
        x: ArrayView2<f64>,
        layout: &RiskSetLayout,
    ) -> Result<OptimizationOutcome> {
        let ties = self.config.ties;
        let mut beta = Array1::zeros(x.ncols());
        let mut current = compute_likelihood_derivatives(x, &beta, layout, ties)?;
        let null_log_likelihood = current.log_likelihood;

        if x.ncols() == 0 {
            return Ok(OptimizationOutcome {
                beta,
                log_likelihood: current.log_likelihood,
                null_log_likelihood,
                hessian: current.hessian,
                iterations: 0,
                converged: true,
            });
        }

        let mut converged = false;
        let mut iterations = 0;

        for iteration in 1..=self.config.max_iterations {
            iterations = iteration;

            // H is negative definite at a proper maximum, so solve (-H) step = g
            let information = current.hessian.mapv(|h| -h);
            let step = match solve_linear_system(&information, &current.gradient) {
                Ok(step) => step,
                // singular at beta = 0 means collinear or constant covariates
                Err(e) if iteration == 1 => return Err(e),
                Err(_) => {
                    warn!(
                        "information matrix became singular at iteration {}; \
                         coefficients are diverging (monotone likelihood)",
                        iteration
                    );
                    break;
                }
            };
            let newton_norm = step.dot(&step).sqrt();

            let mut scale = 1.0;
            let mut halvings = 0;
            let mut accepted = None;
            while halvings <= self.config.max_step_halvings {
                let candidate = &beta + &(scale * &step);
                if let Ok(next) = compute_likelihood_derivatives(x, &candidate, layout, ties) {
                    if next.log_likelihood >= current.log_likelihood - 1e-12 {
                        accepted = Some((candidate, next));
                        break;
                    }
                }
                scale *= 0.5;
                halvings += 1;
            }

            let (candidate, next) = match accepted {
                Some(accepted) => accepted,
                None => {
                    warn!(
                        "no improving step after {} halvings at iteration {}",
                        self.config.max_step_halvings, iteration
                    );
                    break;
                }
            };

            let likelihood_change = (next.log_likelihood - current.log_likelihood).abs();

            debug!(
                "newton-raphson iter {}: loglik = {:.8}, |newton step| = {:.3e}, halvings = {}",
                iteration, next.log_likelihood, newton_norm, halvings
            );

            beta = candidate;
            current = next;

            if newton_norm < self.config.tolerance {
                converged = true;
                break;
            }

            if likelihood_change < self.config.likelihood_tolerance {
                if newton_norm < PLATEAU_STEP {
                    converged = true;
                } else {
                    warn!(
                        "log-likelihood stopped improving while the newton step is still {:.3e}; \
                         covariates may perfectly separate the event order",
                        newton_norm
                    );
                }
                break;
            }
        }

        if !converged {
            warn!("newton-raphson stopped after {} iterations without converging", iterations);
        }

        Ok(OptimizationOutcome {
            beta,
            log_likelihood: current.log_likelihood,
            null_log_likelihood,
            hessian: current.hessian,
            iterations,
            converged,
        })
    }
}

/// Solve Ax = b by gaussian elimination with partial pivoting
pub(crate) fn solve_linear_system(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return Err(SurvivalError::invalid_dimensions("Matrix dimensions mismatch"));
    }

    let mut a_copy = a.clone();
    let mut b_copy = b.clone();

    // Forward elimination
    for i in 0..n {
        let max_row = (i..n)
            .max_by(|&r, &s| a_copy[[r, i]].abs().total_cmp(&a_copy[[s, i]].abs()))
            .unwrap_or(i);

        if !(a_copy[[max_row, i]].abs() >= SINGULAR_PIVOT) {
            return Err(SurvivalError::singular_hessian(
                format!("pivot {} in column {} is effectively zero", a_copy[[max_row, i]], i)
            ));
        }

        if max_row != i {
            for j in 0..n {
                a_copy.swap([i, j], [max_row, j]);
            }
            b_copy.swap(i, max_row);
        }

        for k in i + 1..n {
            let factor = a_copy[[k, i]] / a_copy[[i, i]];
            for j in i..n {
                a_copy[[k, j]] -= factor * a_copy[[i, j]];
            }
            b_copy[k] -= factor * b_copy[i];
        }
    }

    // Back substitution
    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        x[i] = b_copy[i];
        for j in i + 1..n {
            x[i] -= a_copy[[i, j]] * x[j];
        }
        x[i] /= a_copy[[i, i]];
    }

    Ok(x)
}

/// Invert a square matrix by gauss-jordan elimination
pub(crate) fn invert_matrix(a: &Array2<f64>) -> Result<Array2<f64>> {
    let n = a.nrows();
    if n != a.ncols() {
        return Err(SurvivalError::invalid_dimensions("can only invert square matrices"));
    }

    let mut work = a.clone();
    let mut inverse = Array2::eye(n);

    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&r, &s| work[[r, col]].abs().total_cmp(&work[[s, col]].abs()))
            .unwrap_or(col);

        if !(work[[pivot_row, col]].abs() >= SINGULAR_PIVOT) {
            return Err(SurvivalError::singular_hessian(
                format!("information matrix is not invertible (column {})", col)
            ));
        }

        if pivot_row != col {
            for j in 0..n {
                work.swap([col, j], [pivot_row, j]);
                inverse.swap([col, j], [pivot_row, j]);
            }
        }

        let pivot = work[[col, col]];
        for j in 0..n {
            work[[col, j]] /= pivot;
            inverse[[col, j]] /= pivot;
        }

        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = work[[row, col]];
            if factor == 0.0 {
                continue;
            }
            for j in 0..n {
                work[[row, j]] -= factor * work[[col, j]];
                inverse[[row, j]] -= factor * inverse[[col, j]];
            }
        }
    }

    Ok(inverse)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tied_data() -> SurvivalData {
        let times = vec![1.0, 2.0, 2.0, 3.0, 4.0, 5.0, 5.0, 6.0, 7.0, 8.0];
        let events = vec![true, true, true, false, true, true, false, true, true, false];
        let covariates = Array2::from_shape_vec((10, 2), vec![
            1.0, 0.5,
            0.0, 1.2,
            1.0, -0.3,
            1.0, 0.8,
            0.0, 2.0,
            1.0, -1.0,
            0.0, 0.1,
            0.0, 0.4,
            1.0, -0.6,
            0.0, 0.9,
        ]).unwrap();

        SurvivalData::new(times, events, covariates).unwrap()
    }

    fn optimize(ties: TieMethod) -> OptimizationOutcome {
        let data = tied_data();
        let config = OptimizationConfig { ties, ..Default::default() };
        CoxOptimizer::new(config).optimize(data.covariates(), &data).unwrap()
    }

    #[test]
    fn test_layout_groups() {
        let layout = RiskSetLayout::new(&tied_data());
        assert_eq!(layout.n_events(), 7);

        let times: Vec<f64> = layout.event_groups().map(|g| g.time).collect();
        assert_eq!(times, vec![7.0, 6.0, 5.0, 4.0, 2.0, 1.0]);

        let at_two = layout.event_groups().find(|g| g.time == 2.0).unwrap();
        assert_eq!(at_two.events.len(), 2);
    }

    #[test]
    fn test_efron_golden_values() {
        let outcome = optimize(TieMethod::Efron);
        assert!(outcome.converged);
        assert_relative_eq!(outcome.beta[0], 1.7680232733644132, epsilon = 1e-6);
        assert_relative_eq!(outcome.beta[1], 0.8625441304933181, epsilon = 1e-6);
        assert_relative_eq!(outcome.log_likelihood, -10.681931573007155, epsilon = 1e-9);
        assert_relative_eq!(outcome.null_log_likelihood, -11.77220806290031, epsilon = 1e-9);
    }

    #[test]
    fn test_breslow_golden_values() {
        let outcome = optimize(TieMethod::Breslow);
        assert!(outcome.converged);
        assert_relative_eq!(outcome.beta[0], 1.7950423215091085, epsilon = 1e-6);
        assert_relative_eq!(outcome.beta[1], 0.8815079554643679, epsilon = 1e-6);
        assert_relative_eq!(outcome.log_likelihood, -10.791410751028737, epsilon = 1e-9);
        assert_relative_eq!(outcome.null_log_likelihood, -11.889991098556694, epsilon = 1e-9);
    }

    #[test]
    fn test_gradient_vanishes_at_optimum() {
        let data = tied_data();
        let outcome = optimize(TieMethod::Efron);
        let layout = RiskSetLayout::new(&data);
        let at_optimum = compute_likelihood_derivatives(
            data.covariates(), &outcome.beta, &layout, TieMethod::Efron,
        ).unwrap();

        assert!(at_optimum.gradient.iter().all(|g| g.abs() < 1e-6));
    }

    #[test]
    fn test_gradient_matches_finite_difference() {
        let data = tied_data();
        let layout = RiskSetLayout::new(&data);
        let beta = Array1::from(vec![0.3, -0.2]);
        let h = 1e-6;

        for ties in [TieMethod::Efron, TieMethod::Breslow] {
            let at_beta = compute_likelihood_derivatives(data.covariates(), &beta, &layout, ties).unwrap();
            for j in 0..2 {
                let mut up = beta.clone();
                up[j] += h;
                let mut down = beta.clone();
                down[j] -= h;
                let ll_up = compute_likelihood_derivatives(data.covariates(), &up, &layout, ties).unwrap();
                let ll_down = compute_likelihood_derivatives(data.covariates(), &down, &layout, ties).unwrap();

                let numeric = (ll_up.log_likelihood - ll_down.log_likelihood) / (2.0 * h);
                assert_relative_eq!(at_beta.gradient[j], numeric, epsilon = 1e-6);

                for k in 0..2 {
                    let numeric = (ll_up.gradient[k] - ll_down.gradient[k]) / (2.0 * h);
                    assert_relative_eq!(at_beta.hessian[[j, k]], numeric, epsilon = 1e-5);
                }
            }
        }
    }

    #[test]
    fn test_no_ties_means_efron_equals_breslow() {
        let times = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let events = vec![true, true, false, true, true];
        let covariates = Array2::from_shape_vec((5, 1), vec![0.5, -1.0, 0.2, 1.5, 0.0]).unwrap();
        let data = SurvivalData::new(times, events, covariates).unwrap();
        let layout = RiskSetLayout::new(&data);
        let beta = Array1::from(vec![0.4]);

        let efron = compute_likelihood_derivatives(data.covariates(), &beta, &layout, TieMethod::Efron).unwrap();
        let breslow = compute_likelihood_derivatives(data.covariates(), &beta, &layout, TieMethod::Breslow).unwrap();
        assert_relative_eq!(efron.log_likelihood, breslow.log_likelihood, epsilon = 1e-12);
    }

    #[test]
    fn test_far_apart_predictors_stay_finite() {
        // eta = [0, -1000]: a single global shift would underflow the later risk set
        let data = SurvivalData::new(
            vec![1.0, 2.0],
            vec![true, true],
            Array2::from_shape_vec((2, 1), vec![0.0, -1.0]).unwrap(),
        ).unwrap();
        let layout = RiskSetLayout::new(&data);
        let beta = Array1::from(vec![1000.0]);

        for ties in [TieMethod::Efron, TieMethod::Breslow] {
            let derivatives = compute_likelihood_derivatives(data.covariates(), &beta, &layout, ties).unwrap();
            assert_relative_eq!(derivatives.log_likelihood, 0.0, epsilon = 1e-12);
            assert!(derivatives.gradient[0].is_finite());
            assert!(derivatives.hessian[[0, 0]].is_finite());
        }

        let expected = expected_event_covariates(data.covariates(), &beta, &layout, TieMethod::Efron).unwrap();
        assert_relative_eq!(expected[1].1[0], -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_diverging_coefficients_never_report_convergence() {
        // later failures always have smaller x: the likelihood has no maximum
        for n in [30, 100] {
            let times: Vec<f64> = (1..=n).map(|t| t as f64).collect();
            let covariates = Array2::from_shape_fn((n, 1), |(i, _)| -((i + 1) as f64));
            let data = SurvivalData::new(times, vec![true; n], covariates).unwrap();
            let (means, scales) = data.covariate_scaling();
            let x = (&data.covariates() - &means) / &scales;

            let outcome = CoxOptimizer::new(OptimizationConfig::default())
                .optimize(x.view(), &data)
                .unwrap();

            assert!(!outcome.converged);
            assert!(outcome.beta[0] > 0.0);
            assert!(outcome.log_likelihood > outcome.null_log_likelihood);
        }
    }

    #[test]
    fn test_no_events() {
        let data = SurvivalData::new(
            vec![1.0, 2.0],
            vec![false, false],
            Array2::from_shape_vec((2, 1), vec![0.0, 1.0]).unwrap(),
        ).unwrap();
        let result = CoxOptimizer::new(OptimizationConfig::default()).optimize(data.covariates(), &data);
        assert!(matches!(result, Err(SurvivalError::InsufficientData { .. })));
    }

    #[test]
    fn test_constant_covariate_is_singular() {
        let data = SurvivalData::new(
            vec![1.0, 2.0, 3.0],
            vec![true, true, false],
            Array2::from_elem((3, 1), 2.0),
        ).unwrap();
        let result = CoxOptimizer::new(OptimizationConfig::default()).optimize(data.covariates(), &data);
        assert!(matches!(result, Err(SurvivalError::SingularHessian { .. })));
    }

    #[test]
    fn test_iteration_budget() {
        let data = tied_data();
        let config = OptimizationConfig { max_iterations: 1, ..Default::default() };
        let outcome = CoxOptimizer::new(config).optimize(data.covariates(), &data).unwrap();
        assert!(!outcome.converged);
        assert_eq!(outcome.iterations, 1);
    }

    #[test]
    fn test_invalid_config() {
        let data = tied_data();
        let config = OptimizationConfig { tolerance: 0.0, ..Default::default() };
        assert!(CoxOptimizer::new(config).optimize(data.covariates(), &data).is_err());
    }

    #[test]
    fn test_expected_covariates_order() {
        let data = tied_data();
        let layout = RiskSetLayout::new(&data);
        let beta = Array1::zeros(2);
        let expected = expected_event_covariates(data.covariates(), &beta, &layout, TieMethod::Breslow).unwrap();

        let records: Vec<usize> = expected.iter().map(|(i, _)| *i).collect();
        assert_eq!(records, vec![0, 1, 2, 4, 5, 7, 8]);

        // at beta = 0 the first event's expectation is the plain mean of everyone
        let mean_x0 = data.covariates().column(0).mean().unwrap();
        assert_relative_eq!(expected[0].1[0], mean_x0, epsilon = 1e-12);
    }

    #[test]
    fn test_solve_and_invert() {
        let a = Array2::from_shape_vec((2, 2), vec![4.0, 1.0, 2.0, 3.0]).unwrap();
        let b = Array1::from(vec![1.0, 2.0]);

        let x = solve_linear_system(&a, &b).unwrap();
        assert_relative_eq!(x[0], 0.1, epsilon = 1e-12);
        assert_relative_eq!(x[1], 0.6, epsilon = 1e-12);

        let inv = invert_matrix(&a).unwrap();
        let identity = a.dot(&inv);
        assert_relative_eq!(identity[[0, 0]], 1.0, epsilon = 1e-12);
        assert_relative_eq!(identity[[0, 1]], 0.0, epsilon = 1e-12);
        assert_relative_eq!(identity[[1, 0]], 0.0, epsilon = 1e-12);

        let singular = Array2::from_shape_vec((2, 2), vec![1.0, 2.0, 2.0, 4.0]).unwrap();
        assert!(matches!(invert_matrix(&singular), Err(SurvivalError::SingularHessian { .. })));
        assert!(solve_linear_system(&singular, &b).is_err());
    }
}
