//! Zero-mean / unit-variance feature standardization

use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::Serialize;

use crate::Error;

/// Standard deviations at or below this are treated as zero
const MIN_STD: f64 = 1e-12;

/// Per-feature population mean and standard deviation learned from a matrix
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StandardScaler {
    pub mean: Array1<f64>,
    /// Population standard deviation (ddof = 0)
    pub std: Array1<f64>,
}

impl StandardScaler {
    /// Learn mean and standard deviation of each column
    ///
    /// # Errors
    /// * `InsufficientData` with fewer than two rows
    pub fn fit(features: &Array2<f64>) -> crate::Result<Self> {
        if features.nrows() < 2 {
            return Err(Error::InsufficientData(format!(
                "scaling needs at least 2 customers, got {}",
                features.nrows()
            )));
        }

        let mean = features
            .mean_axis(Axis(0))
            .ok_or_else(|| Error::InsufficientData("empty feature matrix".to_string()))?;
        let std = features.std_axis(Axis(0), 0.0);

        Ok(Self { mean, std })
    }

    /// Standardize every row; zero-variance features map to 0
    pub fn transform(&self, features: &Array2<f64>) -> crate::Result<Array2<f64>> {
        self.check_width(features.ncols())?;
        let mut scaled = features.to_owned();
        for mut row in scaled.outer_iter_mut() {
            let standardized = self.standardize(row.view());
            row.assign(&standardized);
        }
        Ok(scaled)
    }

    pub fn fit_transform(features: &Array2<f64>) -> crate::Result<(Self, Array2<f64>)> {
        let scaler = Self::fit(features)?;
        let scaled = scaler.transform(features)?;
        Ok((scaler, scaled))
    }

    /// Standardize a single point with the fitted statistics
    pub fn transform_point(&self, point: &[f64]) -> crate::Result<Array1<f64>> {
        self.check_width(point.len())?;
        Ok(self.standardize(ArrayView1::from(point)))
    }

    fn standardize(&self, row: ArrayView1<f64>) -> Array1<f64> {
        row.iter()
            .zip(self.mean.iter().zip(self.std.iter()))
            .map(|(&x, (&mean, &std))| if std > MIN_STD { (x - mean) / std } else { 0.0 })
            .collect()
    }

    fn check_width(&self, width: usize) -> crate::Result<()> {
        if width != self.mean.len() {
            return Err(Error::MalformedInput(format!(
                "expected {} features, got {}",
                self.mean.len(),
                width
            )));
        }
        Ok(())
    }
}
