//! Kaplan-Meier product-limit estimator with Greenwood variance.

use log::debug;

use crate::{
    data::SurvivalData,
    error::{check_confidence_level, Result, SurvivalError},
    metrics::normal_critical_value,
};

/// kaplan-meier estimator config - fit it against a dataset to get a curve
#[derive(Debug, Clone)]
pub struct KaplanMeierEstimator {
    confidence_level: f64,  // for the pointwise CI band
}

impl Default for KaplanMeierEstimator {
    fn default() -> Self {
        Self { confidence_level: 0.95 }
    }
}

impl KaplanMeierEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// level of the pointwise confidence band, e.g. 0.95
    pub fn with_confidence_level(mut self, level: f64) -> Self {
        self.confidence_level = level;
        self
    }

    /// Estimate the survival function.
    ///
    /// Ties among events at one time are merged into a single step. A record
    /// censored at an event time is still in that time's risk set but never
    /// counts as an event.
    pub fn fit(&self, data: &SurvivalData) -> Result<KaplanMeierResult> {
        let confidence_level = check_confidence_level(self.confidence_level)?;
        if data.n_samples() == 0 {
            return Err(SurvivalError::insufficient_data(
                "kaplan-meier needs at least one record"
            ));
        }

        let z = normal_critical_value(confidence_level)?;
        let times = data.times();
        let events = data.events();
        let order = data.sorted_order();

        let mut result = KaplanMeierResult {
            event_times: Vec::new(),
            at_risk: Vec::new(),
            events: Vec::new(),
            censored: Vec::new(),
            survival: Vec::new(),
            variance: Vec::new(),
            ci_lower: Vec::new(),
            ci_upper: Vec::new(),
            n_samples: data.n_samples(),
            n_events: data.n_events(),
            confidence_level,
        };

        let mut n_at_risk = data.n_samples();
        let mut survival = 1.0;
        let mut greenwood_sum = 0.0;

        let mut start = 0;
        while start < order.len() {
            let t = times[order[start]];
            let end = start + order[start..].iter().take_while(|&&i| times[i] == t).count();

            let n_events = order[start..end].iter().filter(|&&i| events[i]).count();
            let n_censored = (end - start) - n_events;

            if n_events > 0 {
                let n = n_at_risk as f64;
                let d = n_events as f64;

                survival *= 1.0 - d / n;
                let variance = if n_events < n_at_risk {
                    greenwood_sum += d / (n * (n - d));
                    survival * survival * greenwood_sum
                } else {
                    // everyone left failed here - curve is at 0
                    greenwood_sum = f64::INFINITY;
                    0.0
                };
                let (lower, upper) = log_log_interval(survival, greenwood_sum, z);

                result.event_times.push(t);
                result.at_risk.push(n_at_risk);
                result.events.push(n_events);
                result.censored.push(n_censored);
                result.survival.push(survival);
                result.variance.push(variance);
                result.ci_lower.push(lower);
                result.ci_upper.push(upper);
            }

            // everybody observed at t leaves the risk set afterwards
            n_at_risk -= end - start;
            start = end;
        }

        debug!(
            "kaplan-meier: {} records, {} events, {} distinct event times, final S = {:.4}",
            result.n_samples,
            result.n_events,
            result.event_times.len(),
            survival
        );

        Ok(result)
    }
}

/// exponential greenwood ("log-log") band, keeps bounds inside [0, 1]
fn log_log_interval(survival: f64, greenwood_sum: f64, z: f64) -> (f64, f64) {
    if survival <= 0.0 || survival >= 1.0 || !greenwood_sum.is_finite() {
        return (survival, survival);
    }
    let log_s = survival.ln();
    let spread = z * (greenwood_sum / (log_s * log_s)).sqrt();
    (survival.powf(spread.exp()), survival.powf((-spread).exp()))
}

/// one row of the kaplan-meier event table
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KmStep {
    pub time: f64,
    /// records with duration >= time
    pub at_risk: usize,
    pub events: usize,
    /// records censored exactly at this time
    pub censored: usize,
    pub survival: f64,
    /// greenwood variance of the survival estimate
    pub variance: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
}

/// fitted kaplan-meier curve, keyed by distinct event time
#[derive(Debug, Clone)]
pub struct KaplanMeierResult {
    event_times: Vec<f64>,
    at_risk: Vec<usize>,
    events: Vec<usize>,
    censored: Vec<usize>,
    survival: Vec<f64>,
    variance: Vec<f64>,
    ci_lower: Vec<f64>,
    ci_upper: Vec<f64>,
    n_samples: usize,
    n_events: usize,
    confidence_level: f64,
}

impl KaplanMeierResult {
    /// S(t) - right-continuous step lookup
    ///
    /// 1 before the first event time, the last estimate after the last event
    /// time (no extrapolation to 0). NaN in, NaN out.
    pub fn predict(&self, t: f64) -> f64 {
        if t.is_nan() {
            return f64::NAN;
        }
        let idx = self.event_times.partition_point(|&et| et <= t);
        if idx == 0 {
            1.0
        } else {
            self.survival[idx - 1]
        }
    }

    pub fn predict_many(&self, times: &[f64]) -> Vec<f64> {
        times.iter().map(|&t| self.predict(t)).collect()
    }

    /// first event time where S(t) <= 0.5, if the curve gets there
    pub fn median_survival(&self) -> Option<f64> {
        self.survival
            .iter()
            .position(|&s| s <= 0.5)
            .map(|i| self.event_times[i])
    }

    /// (time, survival) pairs for plotting
    pub fn survival_function(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.event_times.iter().copied().zip(self.survival.iter().copied())
    }

    /// the event table, one row per distinct event time
    pub fn steps(&self) -> impl Iterator<Item = KmStep> + '_ {
        (0..self.event_times.len()).map(move |i| KmStep {
            time: self.event_times[i],
            at_risk: self.at_risk[i],
            events: self.events[i],
            censored: self.censored[i],
            survival: self.survival[i],
            variance: self.variance[i],
            ci_lower: self.ci_lower[i],
            ci_upper: self.ci_upper[i],
        })
    }

    pub fn event_times(&self) -> &[f64] {
        &self.event_times
    }

    pub fn at_risk(&self) -> &[usize] {
        &self.at_risk
    }

    pub fn events(&self) -> &[usize] {
        &self.events
    }

    pub fn censored(&self) -> &[usize] {
        &self.censored
    }

    pub fn survival(&self) -> &[f64] {
        &self.survival
    }

    pub fn variance(&self) -> &[f64] {
        &self.variance
    }

    pub fn ci_lower(&self) -> &[f64] {
        &self.ci_lower
    }

    pub fn ci_upper(&self) -> &[f64] {
        &self.ci_upper
    }

    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    pub fn n_events(&self) -> usize {
        self.n_events
    }

    pub fn n_censored(&self) -> usize {
        self.n_samples - self.n_events
    }

    pub fn confidence_level(&self) -> f64 {
        self.confidence_level
    }
}
