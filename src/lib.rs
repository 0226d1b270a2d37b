//! # survkit
//!
//! survival analysis for right-censored data - kaplan-meier curves, cox
//! proportional hazards and a check that the proportional hazards assumption holds
//!
//! ## what you get
//!
//! - kaplan-meier with greenwood variance + log-log confidence bands
//! - cox regression fit by newton-raphson, efron or breslow ties
//! - wald stats, hazard ratios, concordance, partial aic, likelihood ratio test
//! - schoenfeld-residual test for non-proportional hazards
//! - categorical encoding + a one-call analysis pipeline
//!
//! ## quick start
//!
//! ```rust
//! use survkit::{CoxModel, KaplanMeierEstimator, ProportionalHazardsTest, SurvivalData};
//! use ndarray::Array2;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let times = vec![5.0, 8.0, 12.0, 3.0, 9.0, 15.0];
//! let events = vec![true, true, false, true, false, true]; // false = censored
//! let covariates = Array2::from_shape_vec((6, 1), vec![
//!     1.0, 0.0, 0.0, 1.0, 1.0, 0.0,  // treated?
//! ])?;
//! let data = SurvivalData::new(times, events, covariates)?
//!     .with_feature_names(vec!["treated"])?;
//!
//! let curve = KaplanMeierEstimator::new().fit(&data)?;
//! println!("S(10) = {:.3}", curve.predict(10.0));
//!
//! let fit = CoxModel::new().fit(&data)?;
//! println!("hazard ratio = {:.3}", fit.hazard_ratios()[0]);
//!
//! let ph = ProportionalHazardsTest::new().test(&fit, &data)?;
//! println!("ph violations: {:?}", ph.violations(0.05));
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod data;
pub mod descriptive;
pub mod encoding;
pub mod error;
pub mod kaplan_meier;
pub mod metrics;
pub mod model;
pub mod optimization;

pub use analysis::{AnalysisConfig, AnalysisReport, SurvivalAnalysis};
pub use data::{SurvivalData, SurvivalRecord};
pub use error::{Result, SurvivalError};
pub use kaplan_meier::{KaplanMeierEstimator, KaplanMeierResult};
pub use model::{CoxFitResult, CoxModel};
pub use optimization::TieMethod;
pub use ph_test::{PhTestResult, ProportionalHazardsTest, TimeTransform};
