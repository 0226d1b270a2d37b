use survkit::{
    analysis::{AnalysisConfig, SurvivalAnalysis},
    encoding::{CovariateColumn, CovariateEncoder},
    metrics::ModelMetrics,
    CoxModel, KaplanMeierEstimator, ProportionalHazardsTest, TieMethod, TimeTransform,
};
use ndarray::Array2;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Survival Analysis - Basic Usage Example");
    println!("=======================================\n");

    // months of follow-up for 20 patients
    let times = vec![1.2, 2.1, 3.5, 4.2, 5.8, 6.1, 7.3, 8.9, 9.2, 10.5,
                     2.3, 3.1, 4.8, 5.2, 6.9, 7.1, 8.3, 9.8, 10.1, 11.2];

    let events = vec![true, false, true, true, false, true, true, false, true, false,
                      true, true, false, true, true, false, true, true, false, true];

    let age = vec![65.0, 70.0, 55.0, 62.0, 68.0, 72.0, 58.0, 66.0, 71.0, 59.0,
                   63.0, 69.0, 57.0, 64.0, 67.0, 73.0, 61.0, 65.0, 70.0, 56.0];
    let biomarker = vec![2.3, 1.8, 3.1, 2.1, 2.8, 1.5, 3.4, 1.9, 2.6, 2.0,
                         2.9, 1.7, 3.2, 2.2, 2.7, 1.6, 3.0, 1.8, 2.5, 2.4];
    let arm = vec!["placebo", "drug", "placebo", "drug", "placebo", "drug", "placebo",
                   "drug", "placebo", "drug", "placebo", "drug", "placebo", "drug",
                   "placebo", "drug", "placebo", "drug", "placebo", "drug"];

    // Step 1: encode the categorical treatment arm
    let columns = vec![
        CovariateColumn::numeric("age", age),
        CovariateColumn::categorical("arm", arm),
        CovariateColumn::numeric("biomarker", biomarker),
    ];
    let (encoder, encoded) = CovariateEncoder::fit_transform(&columns)?;
    let data = encoded.into_survival_data(times, events)?;

    println!("Dataset Information:");
    println!("  - Number of samples: {}", data.n_samples());
    println!("  - Number of events: {}", data.n_events());
    println!("  - Number of censored: {}", data.n_samples() - data.n_events());
    println!("  - Encoded covariates: {:?}", encoder.feature_names());
    println!();

    // Step 2: kaplan-meier curve
    println!("Kaplan-Meier Estimate");
    println!("---------------------");
    let curve = KaplanMeierEstimator::new().fit(&data)?;

    println!("{:>6} {:>8} {:>7} {:>9} {:>18}", "time", "at risk", "events", "S(t)", "95% CI");
    for step in curve.steps() {
        println!("{:>6.1} {:>8} {:>7} {:>9.4}    ({:.4}, {:.4})",
                 step.time, step.at_risk, step.events, step.survival, step.ci_lower, step.ci_upper);
    }
    match curve.median_survival() {
        Some(median) => println!("Median survival: {:.1} months", median),
        None => println!("Median survival: not reached"),
    }
    println!();

    // Step 3: cox regression
    println!("Cox Proportional Hazards (Efron ties)");
    println!("-------------------------------------");
    let fit = CoxModel::new().with_ties(TieMethod::Efron).fit(&data)?;

    println!("{:<12} {:>9} {:>9} {:>8} {:>8} {:>20}", "covariate", "coef", "HR", "se", "p", "95% CI (HR)");
    for row in fit.summary() {
        println!("{:<12} {:>9.4} {:>9.4} {:>8.4} {:>8.4}    ({:.4}, {:.4})",
                 row.name, row.coefficient, row.hazard_ratio, row.standard_error,
                 row.p_value, row.ci_lower, row.ci_upper);
    }
    println!("converged: {} after {} iterations", fit.converged(), fit.iterations());

    let metrics = ModelMetrics::compute(&fit, &data)?;
    println!("C-index: {:.4}", metrics.concordance);
    println!("Partial AIC: {:.2}", metrics.partial_aic);
    println!("Likelihood ratio test: {:.3} on {} df, p = {:.4}",
             metrics.likelihood_ratio.statistic,
             metrics.likelihood_ratio.degrees_of_freedom,
             metrics.likelihood_ratio.p_value);
    println!();

    // Step 4: proportional hazards check
    println!("Proportional Hazards Test (rank transform)");
    println!("------------------------------------------");
    let ph = ProportionalHazardsTest::new()
        .with_time_transform(TimeTransform::Rank)
        .test(&fit, &data)?;

    for covariate in ph.covariates() {
        println!("{:<12} stat = {:>7.4}  p = {:.4}", covariate.name, covariate.test_statistic, covariate.p_value);
    }
    if let Some(global) = ph.global() {
        println!("{:<12} stat = {:>7.4}  p = {:.4}  (df = {})",
                 "GLOBAL", global.test_statistic, global.p_value, global.degrees_of_freedom);
    }
    println!();

    // Step 5: relative risk for new patients
    println!("Relative Hazard for New Patients");
    println!("--------------------------------");
    let new_patients = vec![
        CovariateColumn::numeric("age", vec![60.0, 75.0]),
        CovariateColumn::categorical("arm", vec!["placebo", "drug"]),
        CovariateColumn::numeric("biomarker", vec![2.5, 1.2]),
    ];
    let new_covariates: Array2<f64> = encoder.transform(&new_patients)?.matrix;
    let hazards = fit.partial_hazards(new_covariates.view())?;
    for (label, hazard) in ["A", "B"].iter().zip(hazards.iter()) {
        println!("  Patient {}: partial hazard = {:.4}", label, hazard);
    }
    println!();

    // Step 6: everything in one go
    println!("One-call Analysis");
    println!("-----------------");
    let config = AnalysisConfig::default().with_report_times(vec![3.0, 6.0, 9.0]);
    let report = SurvivalAnalysis::new(config).run(&data)?;

    for (t, s) in &report.survival_at_report_times {
        println!("  S({:.0}) = {:.4}", t, s);
    }
    if report.caveats.is_empty() {
        println!("  no caveats");
    }
    for caveat in &report.caveats {
        println!("  caveat: {}", caveat);
    }

    Ok(())
}
