use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use crate::error::{Result, SurvivalError};

/// one observed subject - duration, event flag, covariates
#[derive(Debug, Clone, PartialEq)]
pub struct SurvivalRecord {
    pub duration: f64,
    pub event: bool,
    pub covariates: Vec<f64>,
}

impl SurvivalRecord {
    pub fn new(duration: f64, event: bool, covariates: Vec<f64>) -> Self {
        Self { duration, event, covariates }
    }
}

/// survival data - durations, events, and covariates
///
/// immutable once built. every estimator borrows it read-only, so one
/// dataset can feed many fits (bootstrap, cross-validation) in parallel.
#[derive(Debug, Clone)]
pub struct SurvivalData {
    times: Array1<f64>,          // time to event/censoring
    events: Vec<bool>,           // true = event, false = censored
    covariates: Array2<f64>,     // n_samples x n_features
    feature_names: Vec<String>,  // one label per covariate column
    order: Vec<usize>,           // record indices sorted by ascending time
}

impl SurvivalData {
    /// make new survival data from raw vecs/arrays
    ///
    /// durations must be finite and `>= 0` (zero is accepted), covariates
    /// must be finite. an empty dataset is allowed here - the estimators
    /// reject it when asked to fit.
    pub fn new(
        times: Vec<f64>,
        events: Vec<bool>,
        covariates: Array2<f64>,
    ) -> Result<Self> {
        let n_samples = times.len();

        if events.len() != n_samples {
            return Err(SurvivalError::invalid_dimensions(
                format!("times len ({}) != events len ({})", n_samples, events.len())
            ));
        }

        if covariates.nrows() != n_samples {
            return Err(SurvivalError::invalid_dimensions(
                format!("covariates rows ({}) != n_samples ({})", covariates.nrows(), n_samples)
            ));
        }

        if let Some((i, t)) = times.iter().enumerate().find(|(_, t)| **t < 0.0 || !t.is_finite()) {
            return Err(SurvivalError::invalid_survival_data(
                format!("duration at row {} must be finite & >= 0, got {}", i, t)
            ));
        }

        if covariates.iter().any(|x| !x.is_finite()) {
            return Err(SurvivalError::invalid_survival_data(
                "covariates contain NaN or infinite values"
            ));
        }

        let feature_names = (0..covariates.ncols()).map(|j| format!("x{}", j)).collect();

        let mut order: Vec<usize> = (0..n_samples).collect();
        order.sort_by(|&a, &b| times[a].total_cmp(&times[b]));

        Ok(Self {
            times: Array1::from(times),
            events,
            covariates,
            feature_names,
            order,
        })
    }

    /// durations + events only, for kaplan-meier style work
    pub fn without_covariates(times: Vec<f64>, events: Vec<bool>) -> Result<Self> {
        let n_samples = times.len();
        Self::new(times, events, Array2::zeros((n_samples, 0)))
    }

    /// build from row records - all covariate vectors need the same width
    pub fn from_records(records: &[SurvivalRecord]) -> Result<Self> {
        let n_features = records.first().map_or(0, |r| r.covariates.len());

        if let Some(bad) = records.iter().position(|r| r.covariates.len() != n_features) {
            return Err(SurvivalError::invalid_dimensions(format!(
                "record {} has {} covariates, expected {}",
                bad,
                records[bad].covariates.len(),
                n_features
            )));
        }

        let times = records.iter().map(|r| r.duration).collect();
        let events = records.iter().map(|r| r.event).collect();
        let flat: Vec<f64> = records.iter().flat_map(|r| r.covariates.iter().copied()).collect();
        let covariates = Array2::from_shape_vec((records.len(), n_features), flat)
            .map_err(|e| SurvivalError::invalid_dimensions(e.to_string()))?;

        Self::new(times, events, covariates)
    }

    /// attach covariate labels (one per column)
    pub fn with_feature_names<S: Into<String>>(mut self, names: Vec<S>) -> Result<Self> {
        if names.len() != self.n_features() {
            return Err(SurvivalError::invalid_dimensions(format!(
                "got {} feature names for {} covariates",
                names.len(),
                self.n_features()
            )));
        }
        self.feature_names = names.into_iter().map(Into::into).collect();
        Ok(self)
    }

    /// how many subjects
    pub fn n_samples(&self) -> usize {
        self.times.len()
    }

    /// how many covariates per subject
    pub fn n_features(&self) -> usize {
        self.covariates.ncols()
    }

    /// how many observed events
    pub fn n_events(&self) -> usize {
        self.events.iter().filter(|&&e| e).count()
    }

    /// survival/censoring times
    pub fn times(&self) -> ArrayView1<'_, f64> {
        self.times.view()
    }

    /// event indicators (true = event, false = censored)
    pub fn events(&self) -> &[bool] {
        &self.events
    }

    /// covariate matrix
    pub fn covariates(&self) -> ArrayView2<'_, f64> {
        self.covariates.view()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// record indices in ascending time order (ties keep input order)
    pub(crate) fn sorted_order(&self) -> &[usize] {
        &self.order
    }

    /// unique event times in order
    pub fn event_times(&self) -> Vec<f64> {
        let mut times: Vec<f64> = self.order
            .iter()
            .filter(|&&i| self.events[i])
            .map(|&i| self.times[i])
            .collect();
        times.dedup();
        times
    }

    /// grab a subset of subjects by indices
    pub fn subset(&self, indices: &[usize]) -> Result<Self> {
        if indices.iter().any(|&i| i >= self.n_samples()) {
            return Err(SurvivalError::invalid_dimensions(
                "subset index out of bounds"
            ));
        }

        let times: Vec<f64> = indices.iter().map(|&i| self.times[i]).collect();
        let events: Vec<bool> = indices.iter().map(|&i| self.events[i]).collect();
        let covariates = self.covariates.select(Axis(0), indices);

        Self::new(times, events, covariates)?.with_feature_names(self.feature_names.clone())
    }

    /// column means and sample std devs (ddof = 1)
    ///
    /// columns with no spread get a scale of 1 so they are only centered.
    pub fn covariate_scaling(&self) -> (Array1<f64>, Array1<f64>) {
        let n_features = self.n_features();
        if self.n_samples() == 0 {
            return (Array1::zeros(n_features), Array1::ones(n_features));
        }

        let means = self.covariates
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(n_features));
        let ddof = if self.n_samples() > 1 { 1.0 } else { 0.0 };
        let stds = self.covariates
            .std_axis(Axis(0), ddof)
            .mapv(|s| if s > 0.0 && s.is_finite() { s } else { 1.0 });

        (means, stds)
    }
}
