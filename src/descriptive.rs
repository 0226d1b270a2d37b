use ndarray::ArrayView1;

use crate::data::SurvivalData;

/// count / mean / spread / quartiles of one numeric column
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSummary {
    pub name: String,
    pub count: usize,
    pub mean: f64,
    /// sample std dev (ddof = 1), NaN with fewer than 2 values
    pub std_dev: f64,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

impl ColumnSummary {
    /// summarize a column - all-NaN stats for an empty one
    pub fn compute(name: impl Into<String>, values: ArrayView1<f64>) -> Self {
        let name = name.into();
        let count = values.len();
        if count == 0 {
            return Self {
                name,
                count,
                mean: f64::NAN,
                std_dev: f64::NAN,
                min: f64::NAN,
                q1: f64::NAN,
                median: f64::NAN,
                q3: f64::NAN,
                max: f64::NAN,
            };
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let mean = values.sum() / count as f64;
        let std_dev = if count > 1 { values.std(1.0) } else { f64::NAN };

        Self {
            name,
            count,
            mean,
            std_dev,
            min: sorted[0],
            q1: quantile_sorted(&sorted, 0.25),
            median: quantile_sorted(&sorted, 0.5),
            q3: quantile_sorted(&sorted, 0.75),
            max: sorted[count - 1],
        }
    }
}

/// linear interpolation between closest ranks (numpy/pandas default)
fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    sorted[lower] + fraction * (sorted[upper] - sorted[lower])
}

/// overview of a dataset before any modelling
#[derive(Debug, Clone)]
pub struct DatasetSummary {
    pub n_samples: usize,
    pub n_features: usize,
    pub n_events: usize,
    pub n_censored: usize,
    /// share of records with an observed event, NaN for empty data
    pub event_rate: f64,
    pub duration: ColumnSummary,
    pub covariates: Vec<ColumnSummary>,
}

impl DatasetSummary {
    pub fn compute(data: &SurvivalData) -> Self {
        let n_samples = data.n_samples();
        let n_events = data.n_events();
        let event_rate = if n_samples > 0 {
            n_events as f64 / n_samples as f64
        } else {
            f64::NAN
        };

        let covariates = data
            .feature_names()
            .iter()
            .enumerate()
            .map(|(j, name)| ColumnSummary::compute(name.as_str(), data.covariates().column(j)))
            .collect();

        Self {
            n_samples,
            n_features: data.n_features(),
            n_events,
            n_censored: n_samples - n_events,
            event_rate,
            duration: ColumnSummary::compute("duration", data.times()),
            covariates,
        }
    }
}
