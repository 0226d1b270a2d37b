use ndarray::ArrayView1;
use statrs::distribution::{ChiSquared, ContinuousCDF, Normal};

use crate::{
    data::SurvivalData,
    error::{check_confidence_level, Result, SurvivalError},
    model::CoxFitResult,
};

/// Upper-tail probability of a chi-square(df) statistic
pub fn chi_squared_p_value(statistic: f64, degrees_of_freedom: usize) -> Result<f64> {
    if degrees_of_freedom == 0 {
        return Err(SurvivalError::invalid_parameter("degrees_of_freedom", "0"));
    }
    if statistic.is_nan() {
        return Err(SurvivalError::numerical_error("chi-square statistic is NaN"));
    }
    if statistic <= 0.0 {
        return Ok(1.0);
    }
    if statistic.is_infinite() {
        return Ok(0.0);
    }

    let dist = ChiSquared::new(degrees_of_freedom as f64)
        .map_err(|e| SurvivalError::numerical_error(e.to_string()))?;
    Ok(dist.sf(statistic))
}

/// Two-sided standard normal critical value, 1.96 for a 0.95 level
pub fn normal_critical_value(confidence_level: f64) -> Result<f64> {
    let level = check_confidence_level(confidence_level)?;
    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| SurvivalError::numerical_error(e.to_string()))?;
    Ok(normal.inverse_cdf(1.0 - (1.0 - level) / 2.0))
}

/// Harrell's C-index - how often does the higher risk score fail first?
///
/// A pair (i, j) is comparable when i has an observed event and j outlived
/// it. Tied risk scores count as half concordant.
pub fn concordance_index(
    risk_scores: ArrayView1<f64>,
    times: ArrayView1<f64>,
    events: &[bool],
) -> Result<f64> {
    let n = risk_scores.len();
    if n != times.len() || n != events.len() {
        return Err(SurvivalError::invalid_dimensions(
            "risk scores, times, and events must have same length"
        ));
    }

    let mut concordant = 0.0;
    let mut comparable = 0.0;

    for i in 0..n {
        if !events[i] {
            continue; // censored obs can't anchor a pair
        }

        for j in 0..n {
            if i == j {
                continue;
            }

            // j outlived i (a censored j at the same time still counts)
            if times[j] > times[i] || (!events[j] && times[j] >= times[i]) {
                comparable += 1.0;

                if risk_scores[i] > risk_scores[j] {
                    concordant += 1.0;
                } else if risk_scores[i] == risk_scores[j] {
                    concordant += 0.5;
                }
            }
        }
    }

    if comparable == 0.0 {
        return Err(SurvivalError::numerical_error(
            "no comparable pairs for concordance calc"
        ));
    }

    Ok(concordant / comparable)
}

/// Partial AIC for a Cox model
pub fn partial_aic(log_likelihood: f64, n_parameters: usize) -> f64 {
    2.0 * n_parameters as f64 - 2.0 * log_likelihood
}

/// BIC, penalizing by the number of observed events
pub fn partial_bic(log_likelihood: f64, n_parameters: usize, n_events: usize) -> f64 {
    (n_parameters as f64) * (n_events.max(1) as f64).ln() - 2.0 * log_likelihood
}

/// Likelihood-ratio test of a fitted model against the null (beta = 0)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LikelihoodRatioTest {
    pub statistic: f64,
    pub degrees_of_freedom: usize,
    pub p_value: f64,
}

pub fn log_likelihood_ratio_test(fit: &CoxFitResult) -> Result<LikelihoodRatioTest> {
    let degrees_of_freedom = fit.n_features();
    let statistic = (2.0 * (fit.log_likelihood() - fit.null_log_likelihood())).max(0.0);
    let p_value = if degrees_of_freedom == 0 {
        1.0
    } else {
        chi_squared_p_value(statistic, degrees_of_freedom)?
    };

    Ok(LikelihoodRatioTest {
        statistic,
        degrees_of_freedom,
        p_value,
    })
}

/// Goodness-of-fit numbers for a fitted Cox model
#[derive(Debug, Clone)]
pub struct ModelMetrics {
    pub concordance: f64,
    pub log_likelihood: f64,
    pub partial_aic: f64,
    pub partial_bic: f64,
    pub likelihood_ratio: LikelihoodRatioTest,
}

impl ModelMetrics {
    /// Compute all metrics for a fitted Cox model on its training data
    pub fn compute(fit: &CoxFitResult, data: &SurvivalData) -> Result<Self> {
        let risk_scores = fit.linear_predictor(data.covariates())?;
        let concordance = concordance_index(risk_scores.view(), data.times(), data.events())?;
        let n_parameters = fit.n_features();

        Ok(Self {
            concordance,
            log_likelihood: fit.log_likelihood(),
            partial_aic: partial_aic(fit.log_likelihood(), n_parameters),
            partial_bic: partial_bic(fit.log_likelihood(), n_parameters, fit.n_events()),
            likelihood_ratio: log_likelihood_ratio_test(fit)?,
        })
    }
}
