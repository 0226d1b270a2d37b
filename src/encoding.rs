//! Covariate preprocessing: mixed numeric / categorical columns in, a
//! fixed-width numeric design matrix out.
//!
//! Categorical columns are one-hot encoded over their sorted distinct levels
//! with the first level dropped as the reference, so a column `treatment`
//! with levels `A`, `B` becomes a single indicator `treatment_B`.

use log::warn;
use ndarray::Array2;

use crate::{
    data::SurvivalData,
    error::{Result, SurvivalError},
};

/// raw values of one input column
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    Numeric(Vec<f64>),
    Categorical(Vec<String>),
}

impl ColumnValues {
    fn len(&self) -> usize {
        match self {
            ColumnValues::Numeric(values) => values.len(),
            ColumnValues::Categorical(values) => values.len(),
        }
    }
}

/// a named input column
#[derive(Debug, Clone, PartialEq)]
pub struct CovariateColumn {
    pub name: String,
    pub values: ColumnValues,
}

impl CovariateColumn {
    pub fn numeric(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self { name: name.into(), values: ColumnValues::Numeric(values) }
    }

    pub fn categorical<S: Into<String>>(name: impl Into<String>, values: Vec<S>) -> Self {
        Self {
            name: name.into(),
            values: ColumnValues::Categorical(values.into_iter().map(Into::into).collect()),
        }
    }
}

/// how one input column maps to output columns
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnEncoding {
    Numeric { name: String },
    OneHot {
        name: String,
        reference: String,
        /// non-reference levels, one indicator column each
        levels: Vec<String>,
    },
}

impl ColumnEncoding {
    fn name(&self) -> &str {
        match self {
            ColumnEncoding::Numeric { name } | ColumnEncoding::OneHot { name, .. } => name,
        }
    }

    fn width(&self) -> usize {
        match self {
            ColumnEncoding::Numeric { .. } => 1,
            ColumnEncoding::OneHot { levels, .. } => levels.len(),
        }
    }
}

/// numeric design matrix + the name of every column
#[derive(Debug, Clone)]
pub struct EncodedCovariates {
    pub names: Vec<String>,
    pub matrix: Array2<f64>,
}

impl EncodedCovariates {
    /// pair the encoded covariates with durations and event flags
    pub fn into_survival_data(self, times: Vec<f64>, events: Vec<bool>) -> Result<SurvivalData> {
        SurvivalData::new(times, events, self.matrix)?.with_feature_names(self.names)
    }
}

/// learned encoding, replayable on new rows with [`CovariateEncoder::transform`]
#[derive(Debug, Clone, PartialEq)]
pub struct CovariateEncoder {
    encodings: Vec<ColumnEncoding>,
}

impl CovariateEncoder {
    /// learn the categorical levels of each column
    pub fn fit(columns: &[CovariateColumn]) -> Result<Self> {
        check_lengths(columns)?;

        let encodings = columns
            .iter()
            .map(|column| match &column.values {
                ColumnValues::Numeric(_) => ColumnEncoding::Numeric { name: column.name.clone() },
                ColumnValues::Categorical(values) => {
                    let mut levels: Vec<String> = values.clone();
                    levels.sort();
                    levels.dedup();

                    if levels.len() < 2 {
                        warn!("categorical column {} has a single level, it adds no covariates", column.name);
                    }
                    let reference = levels.first().cloned().unwrap_or_default();
                    let levels = levels.into_iter().skip(1).collect();

                    ColumnEncoding::OneHot {
                        name: column.name.clone(),
                        reference,
                        levels,
                    }
                }
            })
            .collect();

        Ok(Self { encodings })
    }

    pub fn fit_transform(columns: &[CovariateColumn]) -> Result<(Self, EncodedCovariates)> {
        let encoder = Self::fit(columns)?;
        let encoded = encoder.transform(columns)?;
        Ok((encoder, encoded))
    }

    pub fn encodings(&self) -> &[ColumnEncoding] {
        &self.encodings
    }

    /// output column names, in output order
    pub fn feature_names(&self) -> Vec<String> {
        self.encodings
            .iter()
            .flat_map(|encoding| match encoding {
                ColumnEncoding::Numeric { name } => vec![name.clone()],
                ColumnEncoding::OneHot { name, levels, .. } => {
                    levels.iter().map(|level| format!("{}_{}", name, level)).collect()
                }
            })
            .collect()
    }

    /// encode columns laid out the same way as the ones we were fitted on
    pub fn transform(&self, columns: &[CovariateColumn]) -> Result<EncodedCovariates> {
        let n_rows = check_lengths(columns)?;

        if columns.len() != self.encodings.len() {
            return Err(SurvivalError::invalid_dimensions(format!(
                "encoder expects {} columns, got {}",
                self.encodings.len(),
                columns.len()
            )));
        }

        let width: usize = self.encodings.iter().map(ColumnEncoding::width).sum();
        let mut matrix = Array2::zeros((n_rows, width));
        let mut offset = 0;

        for (encoding, column) in self.encodings.iter().zip(columns) {
            if encoding.name() != column.name {
                return Err(SurvivalError::invalid_parameter(
                    format!("column {}", encoding.name()),
                    column.name.clone(),
                ));
            }

            match (encoding, &column.values) {
                (ColumnEncoding::Numeric { .. }, ColumnValues::Numeric(values)) => {
                    for (i, &value) in values.iter().enumerate() {
                        matrix[[i, offset]] = value;
                    }
                }
                (ColumnEncoding::OneHot { reference, levels, .. }, ColumnValues::Categorical(values)) => {
                    for (i, value) in values.iter().enumerate() {
                        if value == reference {
                            continue;
                        }
                        match levels.iter().position(|level| level == value) {
                            Some(j) => matrix[[i, offset + j]] = 1.0,
                            None => {
                                return Err(SurvivalError::invalid_parameter(
                                    format!("{} level", column.name),
                                    value.clone(),
                                ));
                            }
                        }
                    }
                }
                _ => {
                    return Err(SurvivalError::invalid_parameter(
                        format!("{} column kind", column.name),
                        "numeric/categorical mismatch",
                    ));
                }
            }

            offset += encoding.width();
        }

        Ok(EncodedCovariates {
            names: self.feature_names(),
            matrix,
        })
    }
}

/// all columns need the same row count; returns it
fn check_lengths(columns: &[CovariateColumn]) -> Result<usize> {
    let n_rows = columns.first().map_or(0, |c| c.values.len());
    if let Some(bad) = columns.iter().find(|c| c.values.len() != n_rows) {
        return Err(SurvivalError::invalid_dimensions(format!(
            "column {} has {} rows, expected {}",
            bad.name,
            bad.values.len(),
            n_rows
        )));
    }
    Ok(n_rows)
}
