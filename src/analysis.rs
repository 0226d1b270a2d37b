//! End-to-end analysis over one dataset: descriptive summary, Kaplan-Meier
//! curve, Cox fit, model metrics and the proportional hazards check, gathered
//! into one report for whatever renders it.

use log::{info, warn};

use crate::{
    data::SurvivalData,
    descriptive::DatasetSummary,
    error::{check_confidence_level, Result, SurvivalError},
    kaplan_meier::{KaplanMeierEstimator, KaplanMeierResult},
    metrics::ModelMetrics,
    model::{CoxFitResult, CoxModel},
    optimization::{OptimizationConfig, TieMethod},
    ph_test::{PhTestResult, PhTestStatus, ProportionalHazardsTest, TimeTransform},
};

/// knobs for a full analysis run
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// times at which the survival curve is reported
    pub report_times: Vec<f64>,
    pub confidence_level: f64,
    pub ties: TieMethod,
    pub time_transform: TimeTransform,
    /// p-value threshold for flagging proportional hazards violations
    pub significance_level: f64,
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        let optimization = OptimizationConfig::default();
        Self {
            report_times: vec![1.0, 3.0, 6.0, 12.0, 24.0, 36.0],
            confidence_level: 0.95,
            ties: optimization.ties,
            time_transform: TimeTransform::Rank,
            significance_level: 0.05,
            max_iterations: optimization.max_iterations,
            tolerance: optimization.tolerance,
        }
    }
}

impl AnalysisConfig {
    pub fn with_report_times(mut self, times: Vec<f64>) -> Self {
        self.report_times = times;
        self
    }

    pub fn with_confidence_level(mut self, level: f64) -> Self {
        self.confidence_level = level;
        self
    }

    pub fn with_ties(mut self, ties: TieMethod) -> Self {
        self.ties = ties;
        self
    }

    pub fn with_time_transform(mut self, transform: TimeTransform) -> Self {
        self.time_transform = transform;
        self
    }

    pub fn with_significance_level(mut self, alpha: f64) -> Self {
        self.significance_level = alpha;
        self
    }

    pub fn with_max_iterations(mut self, max_iter: usize) -> Self {
        self.max_iterations = max_iter;
        self
    }

    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tolerance = tol;
        self
    }

    fn validate(&self) -> Result<()> {
        check_confidence_level(self.confidence_level)?;
        if !(self.significance_level > 0.0 && self.significance_level < 1.0) {
            return Err(SurvivalError::invalid_parameter(
                "significance_level",
                self.significance_level.to_string(),
            ));
        }
        if let Some(t) = self.report_times.iter().find(|t| !t.is_finite() || **t < 0.0) {
            return Err(SurvivalError::invalid_parameter("report_times", t.to_string()));
        }
        Ok(())
    }
}

/// cox part of the report - present only when the fit itself succeeded
#[derive(Debug, Clone)]
pub struct CoxSection {
    pub fit: CoxFitResult,
    /// absent when no concordance pair could be formed
    pub metrics: Option<ModelMetrics>,
    /// absent when the test hit a numerical failure
    pub ph_test: Option<PhTestResult>,
}

/// structured output of one analysis run
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub summary: DatasetSummary,
    pub kaplan_meier: KaplanMeierResult,
    /// (time, S(time)) at each configured report time
    pub survival_at_report_times: Vec<(f64, f64)>,
    pub median_survival: Option<f64>,
    /// the fit error is kept so partial results can still be shown
    pub cox: std::result::Result<CoxSection, SurvivalError>,
    /// things a reader should know before trusting the numbers
    pub caveats: Vec<String>,
}

impl AnalysisReport {
    pub fn cox_section(&self) -> Option<&CoxSection> {
        self.cox.as_ref().ok()
    }
}

/// runs the whole pipeline
#[derive(Debug, Clone, Default)]
pub struct SurvivalAnalysis {
    config: AnalysisConfig,
}

impl SurvivalAnalysis {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Kaplan-Meier failures abort the run; Cox failures are recorded in
    /// the report.
    pub fn run(&self, data: &SurvivalData) -> Result<AnalysisReport> {
        self.config.validate()?;
        info!(
            "analysing {} records ({} events, {} covariates)",
            data.n_samples(),
            data.n_events(),
            data.n_features()
        );

        let summary = DatasetSummary::compute(data);

        let kaplan_meier = KaplanMeierEstimator::new()
            .with_confidence_level(self.config.confidence_level)
            .fit(data)?;
        let survival_at_report_times = self.config.report_times
            .iter()
            .map(|&t| (t, kaplan_meier.predict(t)))
            .collect();
        let median_survival = kaplan_meier.median_survival();

        let mut caveats = Vec::new();
        let cox = self.run_cox(data, &mut caveats);

        for caveat in &caveats {
            warn!("{}", caveat);
        }
        info!("analysis finished with {} caveat(s)", caveats.len());

        Ok(AnalysisReport {
            summary,
            kaplan_meier,
            survival_at_report_times,
            median_survival,
            cox,
            caveats,
        })
    }

    fn run_cox(
        &self,
        data: &SurvivalData,
        caveats: &mut Vec<String>,
    ) -> std::result::Result<CoxSection, SurvivalError> {
        let model = CoxModel::new()
            .with_ties(self.config.ties)
            .with_max_iterations(self.config.max_iterations)
            .with_tolerance(self.config.tolerance)
            .with_confidence_level(self.config.confidence_level);

        let fit = match model.fit(data) {
            Ok(fit) => fit,
            Err(e) => {
                caveats.push(format!("cox model could not be fitted: {}", e));
                return Err(e);
            }
        };

        if !fit.converged() {
            caveats.push(format!(
                "cox fit did not converge within {} iterations; estimates may be unreliable",
                fit.iterations()
            ));
        }

        let metrics = match ModelMetrics::compute(&fit, data) {
            Ok(metrics) => Some(metrics),
            Err(e) => {
                caveats.push(format!("model metrics unavailable: {}", e));
                None
            }
        };

        let ph_test = match ProportionalHazardsTest::new()
            .with_time_transform(self.config.time_transform)
            .test(&fit, data)
        {
            Ok(result) => {
                match result.status() {
                    PhTestStatus::NotComputable(reason) => {
                        caveats.push(format!("proportional hazards test not computable: {}", reason));
                    }
                    PhTestStatus::Computed => {
                        let violations = result.violations(self.config.significance_level);
                        if !violations.is_empty() {
                            caveats.push(format!(
                                "proportional hazards assumption questionable for: {}",
                                violations.join(", ")
                            ));
                        }
                    }
                }
                Some(result)
            }
            Err(e) => {
                caveats.push(format!("proportional hazards test failed: {}", e));
                None
            }
        };

        Ok(CoxSection { fit, metrics, ph_test })
    }
}
