use log::{debug, warn};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use crate::{
    data::SurvivalData,
    error::{check_confidence_level, Result, SurvivalError},
    metrics::{chi_squared_p_value, normal_critical_value},
    optimization::{invert_matrix, CoxOptimizer, OptimizationConfig, TieMethod},
};

/// cox proportional hazards fitter
///
/// holds configuration only - every `fit` call allocates its own working
/// state and hands back an immutable [`CoxFitResult`].
#[derive(Debug, Clone)]
pub struct CoxModel {
    ties: TieMethod,                    // efron unless told otherwise
    max_iterations: usize,              // newton-raphson budget
    tolerance: f64,                     // step-norm convergence threshold
    confidence_level: f64,              // for hazard ratio CIs
    standardize: bool,                  // center/scale covariates internally
    feature_names: Option<Vec<String>>, // overrides names carried by the data
}

impl Default for CoxModel {
    fn default() -> Self {
        let defaults = OptimizationConfig::default();
        Self {
            ties: defaults.ties,
            max_iterations: defaults.max_iterations,
            tolerance: defaults.tolerance,
            confidence_level: 0.95,
            standardize: true,
            feature_names: None,
        }
    }
}

impl CoxModel {
    /// new cox model w/ defaults (efron ties, 50 iterations, 1e-6 tolerance)
    pub fn new() -> Self {
        Self::default()
    }

    /// efron or breslow handling of tied event times
    pub fn with_ties(mut self, ties: TieMethod) -> Self {
        self.ties = ties;
        self
    }

    /// max newton-raphson iterations before giving up
    pub fn with_max_iterations(mut self, max_iter: usize) -> Self {
        self.max_iterations = max_iter;
        self
    }

    /// how small the newton step has to get to call it converged
    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tolerance = tol;
        self
    }

    pub fn with_confidence_level(mut self, level: f64) -> Self {
        self.confidence_level = level;
        self
    }

    /// center & scale covariates while optimizing (results stay on the
    /// original scale either way)
    pub fn with_standardization(mut self, standardize: bool) -> Self {
        self.standardize = standardize;
        self
    }

    /// give names to your covariates for nicer output
    pub fn with_feature_names(mut self, names: Vec<String>) -> Self {
        self.feature_names = Some(names);
        self
    }

    pub fn ties(&self) -> TieMethod {
        self.ties
    }

    /// fit the model to data - this does the actual work
    ///
    /// fails on empty data, data without events, or an information matrix
    /// that is singular from the start. running out of iterations or
    /// diverging coefficients (perfect separation) is not an error: the
    /// result comes back with `converged() == false`, and standard errors
    /// are NaN where the curvature is unusable.
    pub fn fit(&self, data: &SurvivalData) -> Result<CoxFitResult> {
        let confidence_level = check_confidence_level(self.confidence_level)?;

        if data.n_samples() == 0 {
            return Err(SurvivalError::insufficient_data("dataset is empty"));
        }
        if data.n_events() == 0 {
            return Err(SurvivalError::insufficient_data(
                "cox regression needs at least one observed event"
            ));
        }

        let feature_names = match &self.feature_names {
            Some(names) if names.len() != data.n_features() => {
                return Err(SurvivalError::invalid_dimensions(format!(
                    "got {} feature names for {} covariates",
                    names.len(),
                    data.n_features()
                )));
            }
            Some(names) => names.clone(),
            None => data.feature_names().to_vec(),
        };

        let n_features = data.n_features();
        let (means, scales) = if self.standardize {
            data.covariate_scaling()
        } else {
            (Array1::zeros(n_features), Array1::ones(n_features))
        };
        let x = (&data.covariates() - &means) / &scales;

        let config = OptimizationConfig {
            max_iterations: self.max_iterations,
            tolerance: self.tolerance,
            ties: self.ties,
            ..Default::default()
        };
        let outcome = CoxOptimizer::new(config).optimize(x.view(), data)?;

        // covariance of the scaled coefficients, then undo the scaling
        let mut converged = outcome.converged;
        let information = outcome.hessian.mapv(|h| -h);
        let scaled_covariance = match invert_matrix(&information) {
            Ok(inverse) => inverse,
            // diverging coefficients leave no usable curvature
            Err(SurvivalError::SingularHessian { .. }) if !converged => {
                warn!("information matrix is singular at the final estimate, standard errors unavailable");
                Array2::from_elem((n_features, n_features), f64::NAN)
            }
            Err(e) => return Err(e),
        };

        let coefficients = &outcome.beta / &scales;
        let mut covariance = Array2::zeros((n_features, n_features));
        for j in 0..n_features {
            for k in 0..n_features {
                covariance[[j, k]] = scaled_covariance[[j, k]] / (scales[j] * scales[k]);
            }
        }

        let variances = covariance.diag().to_owned();
        if variances.iter().any(|v| !(*v > 0.0 && v.is_finite())) {
            if converged {
                warn!("information matrix is not positive definite at the estimate, marking fit unconverged");
            }
            converged = false;
        }
        let standard_errors = variances.mapv(|v| if v > 0.0 && v.is_finite() { v.sqrt() } else { f64::NAN });
        let z_scores = &coefficients / &standard_errors;
        let p_values = z_scores
            .iter()
            .map(|&z| if z.is_nan() { Ok(f64::NAN) } else { chi_squared_p_value(z * z, 1) })
            .collect::<Result<Vec<f64>>>()?;

        let z_crit = normal_critical_value(confidence_level)?;
        let hazard_ratios = coefficients.mapv(f64::exp);
        let ci_lower = (&coefficients - &(z_crit * &standard_errors)).mapv(f64::exp);
        let ci_upper = (&coefficients + &(z_crit * &standard_errors)).mapv(f64::exp);

        if !converged {
            warn!(
                "cox fit stopped after {} iterations without converging; treat estimates with care",
                outcome.iterations
            );
        }
        debug!(
            "cox fit: {} records, {} events, loglik {:.6} (null {:.6}), {} iterations",
            data.n_samples(),
            data.n_events(),
            outcome.log_likelihood,
            outcome.null_log_likelihood,
            outcome.iterations
        );

        Ok(CoxFitResult {
            coefficients,
            standard_errors,
            hazard_ratios,
            z_scores,
            p_values: Array1::from(p_values),
            ci_lower,
            ci_upper,
            covariance,
            log_likelihood: outcome.log_likelihood,
            null_log_likelihood: outcome.null_log_likelihood,
            iterations: outcome.iterations,
            converged,
            ties: self.ties,
            confidence_level,
            feature_names,
            n_samples: data.n_samples(),
            n_events: data.n_events(),
        })
    }
}

/// everything one cox fit produced - coefficients on the original scale
#[derive(Debug, Clone)]
pub struct CoxFitResult {
    coefficients: Array1<f64>,
    standard_errors: Array1<f64>,
    hazard_ratios: Array1<f64>,
    z_scores: Array1<f64>,
    p_values: Array1<f64>,
    ci_lower: Array1<f64>,       // hazard ratio scale
    ci_upper: Array1<f64>,
    covariance: Array2<f64>,     // (-H)^-1
    log_likelihood: f64,
    null_log_likelihood: f64,    // at beta = 0
    iterations: usize,
    converged: bool,
    ties: TieMethod,
    confidence_level: f64,
    feature_names: Vec<String>,
    n_samples: usize,
    n_events: usize,
}

impl CoxFitResult {
    /// the betas
    pub fn coefficients(&self) -> ArrayView1<'_, f64> {
        self.coefficients.view()
    }

    pub fn standard_errors(&self) -> ArrayView1<'_, f64> {
        self.standard_errors.view()
    }

    /// exp(betas)
    pub fn hazard_ratios(&self) -> ArrayView1<'_, f64> {
        self.hazard_ratios.view()
    }

    /// wald z = beta / se
    pub fn z_scores(&self) -> ArrayView1<'_, f64> {
        self.z_scores.view()
    }

    pub fn p_values(&self) -> ArrayView1<'_, f64> {
        self.p_values.view()
    }

    /// lower hazard ratio bound at the fit's confidence level
    pub fn ci_lower(&self) -> ArrayView1<'_, f64> {
        self.ci_lower.view()
    }

    pub fn ci_upper(&self) -> ArrayView1<'_, f64> {
        self.ci_upper.view()
    }

    pub fn covariance(&self) -> ArrayView2<'_, f64> {
        self.covariance.view()
    }

    pub fn log_likelihood(&self) -> f64 {
        self.log_likelihood
    }

    pub fn null_log_likelihood(&self) -> f64 {
        self.null_log_likelihood
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// false when newton-raphson ran out of iterations
    pub fn converged(&self) -> bool {
        self.converged
    }

    pub fn ties(&self) -> TieMethod {
        self.ties
    }

    pub fn confidence_level(&self) -> f64 {
        self.confidence_level
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn n_features(&self) -> usize {
        self.coefficients.len()
    }

    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    pub fn n_events(&self) -> usize {
        self.n_events
    }

    /// risk scores x.beta for new subjects
    pub fn linear_predictor(&self, covariates: ArrayView2<f64>) -> Result<Array1<f64>> {
        if covariates.ncols() != self.n_features() {
            return Err(SurvivalError::invalid_dimensions(
                format!("feature count mismatch: expected {}, got {}",
                       self.n_features(), covariates.ncols())
            ));
        }

        Ok(covariates.dot(&self.coefficients))
    }

    /// exp(x.beta) - hazard relative to a subject with all-zero covariates
    pub fn partial_hazards(&self, covariates: ArrayView2<f64>) -> Result<Array1<f64>> {
        Ok(self.linear_predictor(covariates)?.mapv(f64::exp))
    }

    /// one row per covariate, in covariate order
    pub fn summary(&self) -> Vec<CoefficientSummary> {
        (0..self.n_features())
            .map(|j| CoefficientSummary {
                name: self.feature_names[j].clone(),
                coefficient: self.coefficients[j],
                hazard_ratio: self.hazard_ratios[j],
                standard_error: self.standard_errors[j],
                z: self.z_scores[j],
                p_value: self.p_values[j],
                ci_lower: self.ci_lower[j],
                ci_upper: self.ci_upper[j],
            })
            .collect()
    }
}

/// what the model learned about one covariate
#[derive(Debug, Clone, PartialEq)]
pub struct CoefficientSummary {
    pub name: String,
    pub coefficient: f64,
    pub hazard_ratio: f64,
    pub standard_error: f64,
    pub z: f64,
    pub p_value: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn create_test_data() -> SurvivalData {
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

        SurvivalData::new(times, events, covariates)
            .unwrap()
            .with_feature_names(vec!["treatment", "biomarker"])
            .unwrap()
    }

    #[test]
    fn test_model_creation() {
        let model = CoxModel::new()
            .with_ties(TieMethod::Breslow)
            .with_max_iterations(500)
            .with_tolerance(1e-8);

        assert_eq!(model.ties(), TieMethod::Breslow);
        assert_eq!(model.max_iterations, 500);
        assert_eq!(model.tolerance, 1e-8);
        assert!(model.standardize);
    }

    #[test]
    fn test_efron_golden_fit() {
        let fit = CoxModel::new().fit(&create_test_data()).unwrap();

        assert!(fit.converged());
        assert_eq!(fit.ties(), TieMethod::Efron);
        assert_relative_eq!(fit.coefficients()[0], 1.7680232733644132, epsilon = 1e-6);
        assert_relative_eq!(fit.coefficients()[1], 0.8625441304933181, epsilon = 1e-6);
        assert_relative_eq!(fit.standard_errors()[0], 1.2375042946719217, epsilon = 1e-6);
        assert_relative_eq!(fit.standard_errors()[1], 0.6990281319964534, epsilon = 1e-6);
        assert_relative_eq!(fit.covariance()[[0, 1]], 0.6710854563277491, epsilon = 1e-6);
        assert_relative_eq!(fit.p_values()[0], 0.15309027158979377, epsilon = 1e-6);
        assert_relative_eq!(fit.p_values()[1], 0.21723306911419113, epsilon = 1e-6);
        assert_relative_eq!(fit.ci_lower()[0], 0.518175871069993, epsilon = 1e-5);
        assert_relative_eq!(fit.ci_upper()[0], 66.25342234931875, epsilon = 1e-3);
        assert_relative_eq!(fit.ci_lower()[1], 0.6019831450024715, epsilon = 1e-5);
        assert_relative_eq!(fit.ci_upper()[1], 9.324208600848992, epsilon = 1e-4);
        assert_relative_eq!(fit.log_likelihood(), -10.681931573007155, epsilon = 1e-9);
        assert_relative_eq!(fit.null_log_likelihood(), -11.77220806290031, epsilon = 1e-9);
    }

    #[test]
    fn test_breslow_golden_fit() {
        let fit = CoxModel::new()
            .with_ties(TieMethod::Breslow)
            .fit(&create_test_data())
            .unwrap();

        assert_relative_eq!(fit.coefficients()[0], 1.7950423215091085, epsilon = 1e-6);
        assert_relative_eq!(fit.coefficients()[1], 0.8815079554643679, epsilon = 1e-6);
        assert_relative_eq!(fit.standard_errors()[0], 1.250462310754497, epsilon = 1e-6);
        assert_relative_eq!(fit.standard_errors()[1], 0.7074264759274149, epsilon = 1e-6);
    }

    #[test]
    fn test_standardization_does_not_change_estimates() {
        let data = create_test_data();
        let scaled = CoxModel::new().fit(&data).unwrap();
        let raw = CoxModel::new().with_standardization(false).fit(&data).unwrap();

        for j in 0..2 {
            assert_relative_eq!(scaled.coefficients()[j], raw.coefficients()[j], epsilon = 1e-6);
            assert_relative_eq!(scaled.standard_errors()[j], raw.standard_errors()[j], epsilon = 1e-6);
        }
        assert_relative_eq!(scaled.log_likelihood(), raw.log_likelihood(), epsilon = 1e-9);
    }

    #[test]
    fn test_hazard_ratios_are_exp_coefficients() {
        let fit = CoxModel::new().fit(&create_test_data()).unwrap();
        for (coef, hr) in fit.coefficients().iter().zip(fit.hazard_ratios().iter()) {
            assert_relative_eq!(*hr, coef.exp(), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_summary_rows() {
        let fit = CoxModel::new().fit(&create_test_data()).unwrap();
        let rows = fit.summary();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "treatment");
        assert_eq!(rows[1].name, "biomarker");
        assert!(rows.iter().all(|r| r.ci_lower < r.hazard_ratio && r.hazard_ratio < r.ci_upper));
    }

    #[test]
    fn test_feature_names_override() {
        let names = vec!["a".to_string(), "b".to_string()];
        let fit = CoxModel::new()
            .with_feature_names(names.clone())
            .fit(&create_test_data())
            .unwrap();
        assert_eq!(fit.feature_names(), names.as_slice());

        let bad = CoxModel::new().with_feature_names(vec!["a".to_string()]);
        assert!(matches!(
            bad.fit(&create_test_data()),
            Err(SurvivalError::InvalidDimensions { .. })
        ));
    }

    #[test]
    fn test_empty_and_eventless_data() {
        let empty = SurvivalData::new(vec![], vec![], Array2::zeros((0, 1))).unwrap();
        assert!(matches!(
            CoxModel::new().fit(&empty),
            Err(SurvivalError::InsufficientData { .. })
        ));

        let censored = SurvivalData::new(
            vec![1.0, 2.0, 3.0],
            vec![false, false, false],
            Array2::from_shape_vec((3, 1), vec![0.0, 1.0, 2.0]).unwrap(),
        ).unwrap();
        assert!(matches!(
            CoxModel::new().fit(&censored),
            Err(SurvivalError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_zero_covariates() {
        let data = SurvivalData::without_covariates(
            vec![1.0, 2.0, 3.0],
            vec![true, false, true],
        ).unwrap();
        let fit = CoxModel::new().fit(&data).unwrap();

        assert_eq!(fit.n_features(), 0);
        assert!(fit.converged());
        assert_eq!(fit.log_likelihood(), fit.null_log_likelihood());
    }

    #[test]
    fn test_perfectly_ordered_covariate_gives_unconverged_fit() {
        for n in [5, 30, 500] {
            let times: Vec<f64> = (1..=n).map(|t| t as f64).collect();
            let covariates = Array2::from_shape_fn((n, 1), |(i, _)| -((i + 1) as f64));
            let data = SurvivalData::new(times, vec![true; n], covariates).unwrap();

            for ties in [TieMethod::Efron, TieMethod::Breslow] {
                let fit = CoxModel::new().with_ties(ties).fit(&data).unwrap();

                assert!(!fit.converged());
                assert!(fit.coefficients()[0] > 0.0);
                let se = fit.standard_errors()[0];
                assert!(se.is_nan() || se > 0.0);
                assert_eq!(fit.p_values()[0].is_nan(), se.is_nan());
            }
        }
    }

    #[test]
    fn test_prediction_dimension_mismatch() {
        let fit = CoxModel::new().fit(&create_test_data()).unwrap();

        let wrong_covariates = Array2::zeros((5, 3));
        assert!(fit.linear_predictor(wrong_covariates.view()).is_err());

        let zeros = Array2::zeros((4, 2));
        let hazards = fit.partial_hazards(zeros.view()).unwrap();
        assert!(hazards.iter().all(|&h| h == 1.0));
    }

    #[test]
    fn test_invalid_confidence_level() {
        let model = CoxModel::new().with_confidence_level(0.0);
        assert!(matches!(
            model.fit(&create_test_data()),
            Err(SurvivalError::InvalidParameter { .. })
        ));
    }
}
