//! CSV input and output for the CLI
//!
//! Input files hold numeric feature columns. An optional header row is
//! detected when the first data line does not parse as numbers. Blank lines
//! and lines starting with `#` are skipped.

use anyhow::{bail, Context, Result};
use ndarray::Array2;
use std::path::Path;

/// Feature matrix read from CSV
#[derive(Clone, Debug)]
pub struct Dataset {
    pub header: Option<Vec<String>>,
    pub features: Array2<f64>,
}

impl Dataset {
    /// Load a numeric CSV file
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read CSV file {}", path.as_ref().display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut header = None;
        let mut values = Vec::new();
        let mut feature_count = None;
        let mut rows = 0usize;

        for (line_idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let parts: Vec<&str> = line.split(',').map(str::trim).collect();
            let parsed: std::result::Result<Vec<f64>, _> =
                parts.iter().map(|p| p.parse::<f64>()).collect();

            let row = match parsed {
                Ok(row) => row,
                Err(_) if rows == 0 && header.is_none() => {
                    header = Some(parts.iter().map(|p| p.to_string()).collect::<Vec<_>>());
                    feature_count = Some(parts.len());
                    continue;
                }
                Err(err) => bail!("Line {}: invalid number: {}", line_idx + 1, err),
            };

            match feature_count {
                None => feature_count = Some(row.len()),
                Some(expected) if expected != row.len() => bail!(
                    "Line {}: expected {} features, got {}",
                    line_idx + 1,
                    expected,
                    row.len()
                ),
                Some(_) => {}
            }

            values.extend(row);
            rows += 1;
        }

        if rows == 0 {
            bail!("Dataset is empty");
        }

        let features = Array2::from_shape_vec((rows, feature_count.unwrap_or(0)), values)
            .context("Failed to shape feature matrix")?;

        Ok(Self { header, features })
    }

    pub fn len(&self) -> usize {
        self.features.nrows()
    }

    pub fn feature_count(&self) -> usize {
        self.features.ncols()
    }
}

/// Render an indicator matrix with a header row
pub fn to_csv(header: &[String], matrix: &Array2<f64>) -> String {
    let mut out = header.join(",");
    out.push('\n');
    for row in matrix.rows() {
        let line = row.iter().map(f64::to_string).collect::<Vec<_>>().join(",");
        out.push_str(&line);
        out.push('\n');
    }
    out
}

pub fn write_csv<P: AsRef<Path>>(path: P, header: &[String], matrix: &Array2<f64>) -> Result<()> {
    std::fs::write(path.as_ref(), to_csv(header, matrix))
        .with_context(|| format!("Failed to write {}", path.as_ref().display()))
}
