//! OASIS cohort ingestion and cleaning.
//!
//! Reads the cross-sectional OASIS CSV, keeps the analysis columns
//! (`Age`, `M/F`, `CDR`, `nWBV`, `MMSE`), drops rows with missing values,
//! derives the binary dementia indicator (`CDR == 0` → 0, else 1) and
//! builds a standardized design matrix for the logistic model.

use std::io::Read;
use std::path::Path;

use dm_core::{Error, Result};

/// Column headers the analysis requires, matched exactly.
pub const REQUIRED_COLUMNS: [&str; 5] = ["Age", "M/F", "CDR", "nWBV", "MMSE"];

/// Cell tokens treated as missing.
const MISSING_TOKENS: [&str; 3] = ["", "NA", "N/A"];

/// Cleaned cohort: complete cases only, with the derived dementia indicator.
#[derive(Debug, Clone)]
pub struct Cohort {
    /// Subject age in years.
    pub age: Vec<f64>,
    /// Sex indicator: male = 1.0, female = 0.0.
    pub sex: Vec<f64>,
    /// Clinical Dementia Rating (0, 0.5, 1, 2).
    pub cdr: Vec<f64>,
    /// Normalized whole-brain volume.
    pub nwbv: Vec<f64>,
    /// Mini-Mental State Examination score.
    pub mmse: Vec<f64>,
    /// Derived response: 0 if CDR == 0, else 1.
    pub demented: Vec<u8>,
    /// Rows dropped during cleaning (any missing required cell).
    pub n_dropped: usize,
}

/// Location and scale used to z-score one column.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ColumnScale {
    /// Column name.
    pub name: String,
    /// Sample mean of the cleaned column.
    pub mean: f64,
    /// Sample standard deviation (n-1 denominator).
    pub sd: f64,
}

/// Design matrix for the logistic model, with the response and the scales
/// used for standardization.
#[derive(Debug, Clone)]
pub struct DesignMatrix {
    /// Row-wise predictors: `[z_age, sex, z_mmse, z_nwbv]`.
    pub x: Vec<Vec<f64>>,
    /// Binary response (demented indicator).
    pub y: Vec<u8>,
    /// Predictor names, in column order.
    pub names: Vec<String>,
    /// Standardization scales for the z-scored columns.
    pub scales: Vec<ColumnScale>,
}

fn is_missing(cell: &str) -> bool {
    let t = cell.trim();
    MISSING_TOKENS.iter().any(|&m| m == t)
}

/// Parse a numeric cell. Returns `None` for missing tokens and non-finite
/// values, an error for anything else that fails to parse.
fn parse_cell(cell: &str, column: &str, line: u64) -> Result<Option<f64>> {
    let t = cell.trim();
    if is_missing(t) {
        return Ok(None);
    }
    let v: f64 = t.parse().map_err(|_| {
        Error::Validation(format!("line {}: column '{}' has non-numeric value '{}'", line, column, t))
    })?;
    if v.is_finite() { Ok(Some(v)) } else { Ok(None) }
}

fn parse_sex(cell: &str, line: u64) -> Result<Option<f64>> {
    let t = cell.trim();
    if is_missing(t) {
        return Ok(None);
    }
    match t {
        "M" => Ok(Some(1.0)),
        "F" => Ok(Some(0.0)),
        other => Err(Error::Validation(format!(
            "line {}: column 'M/F' must be 'M' or 'F', got '{}'",
            line, other
        ))),
    }
}

impl Cohort {
    /// Load and clean a cohort from a CSV file.
    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    /// Load and clean a cohort from any CSV reader.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);

        let headers = rdr.headers()?.clone();
        let col_idx = |name: &str| -> Result<usize> {
            headers.iter().position(|h| h == name).ok_or_else(|| {
                Error::Validation(format!("required column '{}' not found in CSV header", name))
            })
        };
        let i_age = col_idx("Age")?;
        let i_sex = col_idx("M/F")?;
        let i_cdr = col_idx("CDR")?;
        let i_nwbv = col_idx("nWBV")?;
        let i_mmse = col_idx("MMSE")?;

        let mut cohort = Cohort {
            age: Vec::new(),
            sex: Vec::new(),
            cdr: Vec::new(),
            nwbv: Vec::new(),
            mmse: Vec::new(),
            demented: Vec::new(),
            n_dropped: 0,
        };

        for record in rdr.records() {
            let record = record?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            let get = |i: usize| -> Result<&str> {
                record.get(i).ok_or_else(|| {
                    Error::Validation(format!("line {}: row has too few fields", line))
                })
            };

            let age = parse_cell(get(i_age)?, "Age", line)?;
            let sex = parse_sex(get(i_sex)?, line)?;
            let cdr = parse_cell(get(i_cdr)?, "CDR", line)?;
            let nwbv = parse_cell(get(i_nwbv)?, "nWBV", line)?;
            let mmse = parse_cell(get(i_mmse)?, "MMSE", line)?;

            match (age, sex, cdr, nwbv, mmse) {
                (Some(age), Some(sex), Some(cdr), Some(nwbv), Some(mmse)) => {
                    cohort.age.push(age);
                    cohort.sex.push(sex);
                    cohort.cdr.push(cdr);
                    cohort.nwbv.push(nwbv);
                    cohort.mmse.push(mmse);
                    cohort.demented.push(if cdr == 0.0 { 0 } else { 1 });
                }
                _ => cohort.n_dropped += 1,
            }
        }

        if cohort.len() == 0 {
            return Err(Error::Validation("no complete rows after cleaning".to_string()));
        }

        tracing::info!(
            n = cohort.len(),
            dropped = cohort.n_dropped,
            demented = cohort.demented.iter().filter(|&&d| d == 1).count(),
            "cohort loaded"
        );

        Ok(cohort)
    }

    /// Number of complete-case subjects.
    pub fn len(&self) -> usize {
        self.age.len()
    }

    /// True if the cohort is empty.
    pub fn is_empty(&self) -> bool {
        self.age.is_empty()
    }

    /// Number of demented subjects (CDR > 0).
    pub fn n_demented(&self) -> usize {
        self.demented.iter().filter(|&&d| d == 1).count()
    }

    /// Build the standardized design matrix `[z_age, sex, z_mmse, z_nwbv]`
    /// with the demented indicator as response.
    ///
    /// Errors if any z-scored column is constant or if the response does not
    /// contain both classes (a single-class response makes the intercept-only
    /// model degenerate).
    pub fn design_matrix(&self) -> Result<DesignMatrix> {
        let n_dem = self.n_demented();
        if n_dem == 0 || n_dem == self.len() {
            return Err(Error::Validation(format!(
                "response must contain both classes: {} of {} subjects demented",
                n_dem,
                self.len()
            )));
        }

        let (z_age, s_age) = zscore("Age", &self.age)?;
        let (z_mmse, s_mmse) = zscore("MMSE", &self.mmse)?;
        let (z_nwbv, s_nwbv) = zscore("nWBV", &self.nwbv)?;

        let x: Vec<Vec<f64>> = (0..self.len())
            .map(|i| vec![z_age[i], self.sex[i], z_mmse[i], z_nwbv[i]])
            .collect();

        Ok(DesignMatrix {
            x,
            y: self.demented.clone(),
            names: vec![
                "z_age".to_string(),
                "sex_male".to_string(),
                "z_mmse".to_string(),
                "z_nwbv".to_string(),
            ],
            scales: vec![s_age, s_mmse, s_nwbv],
        })
    }
}

/// Sample mean.
pub fn mean(v: &[f64]) -> f64 {
    v.iter().sum::<f64>() / v.len() as f64
}

/// Sample standard deviation (n-1 denominator).
pub fn sample_sd(v: &[f64]) -> f64 {
    let m = mean(v);
    (v.iter().map(|&x| (x - m).powi(2)).sum::<f64>() / (v.len() as f64 - 1.0)).sqrt()
}

/// Z-score a column using its sample mean and standard deviation.
pub fn zscore(name: &str, v: &[f64]) -> Result<(Vec<f64>, ColumnScale)> {
    if v.len() < 2 {
        return Err(Error::Validation(format!(
            "column '{}' needs at least 2 values to standardize, got {}",
            name,
            v.len()
        )));
    }
    let m = mean(v);
    let sd = sample_sd(v);
    if !sd.is_finite() || sd <= 0.0 {
        return Err(Error::Validation(format!(
            "column '{}' is constant (sd={}), cannot standardize",
            name, sd
        )));
    }
    let z = v.iter().map(|&x| (x - m) / sd).collect();
    Ok((z, ColumnScale { name: name.to_string(), mean: m, sd }))
}
