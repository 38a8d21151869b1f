//! Scalar and fixed-width array items

use ndarray::Array2;

use crate::error::{Error, Result};
use crate::item::{grow_with, ItemValues, Role, ValueKind};

/// A named scalar real variable.
#[derive(Debug, Clone)]
pub struct RealItem {
    name: String,
    role: Role,
    training: Vec<f64>,
    forecast: Vec<f64>,
    forecast_uncertainty: Vec<f64>,
}

impl RealItem {
    pub fn new(role: Role, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role,
            training: Vec::new(),
            forecast: Vec::new(),
            forecast_uncertainty: Vec::new(),
        }
    }

    pub fn set_training_values(&mut self, values: Vec<f64>) {
        self.training = values;
    }

    pub fn set_forecast_inputs(&mut self, values: Vec<f64>) {
        self.forecast = values;
    }

    /// Forecast stream, predictions included once regression has run
    pub fn forecast(&self) -> &[f64] {
        &self.forecast
    }

    pub fn forecast_uncertainty(&self) -> &[f64] {
        &self.forecast_uncertainty
    }
}

impl ItemValues for RealItem {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> Role {
        self.role
    }

    fn value_kind(&self) -> ValueKind {
        ValueKind::Real
    }

    fn column_count(&self) -> usize {
        1
    }

    fn num_training_values(&self) -> usize {
        self.training.len()
    }

    fn num_forecast_values(&self) -> usize {
        self.forecast.len()
    }

    fn training_values(&self, row: usize) -> Result<Array2<f64>> {
        let value = *self
            .training
            .get(row)
            .ok_or_else(|| Error::RowCountMismatch {
                item: self.name.clone(),
                expected: row + 1,
                actual: self.training.len(),
            })?;
        Ok(Array2::from_elem((1, 1), value))
    }

    fn forecast_values(&self, row: usize) -> Result<Array2<f64>> {
        let value = *self
            .forecast
            .get(row)
            .ok_or_else(|| Error::RowCountMismatch {
                item: self.name.clone(),
                expected: row + 1,
                actual: self.forecast.len(),
            })?;
        Ok(Array2::from_elem((1, 1), value))
    }

    fn set_forecast_values(
        &mut self,
        row: usize,
        values: &Array2<f64>,
        uncertainty: &Array2<f64>,
    ) -> Result<()> {
        grow_with(&mut self.forecast, row + 1, f64::NAN);
        grow_with(&mut self.forecast_uncertainty, row + 1, f64::NAN);
        self.forecast[row] = values[(0, 0)];
        self.forecast_uncertainty[row] = uncertainty[(0, 0)];
        Ok(())
    }
}

/// A named variable whose values are fixed-length real arrays.
#[derive(Debug, Clone)]
pub struct RealArrayItem {
    name: String,
    role: Role,
    width: usize,
    training: Vec<Vec<f64>>,
    forecast: Vec<Vec<f64>>,
    forecast_uncertainty: Vec<Vec<f64>>,
}

impl RealArrayItem {
    pub fn new(role: Role, name: impl Into<String>, width: usize) -> Result<Self> {
        if width == 0 {
            return Err(Error::InvalidParameter {
                name: "width",
                value: "0".into(),
                reason: "array items need at least one column".into(),
            });
        }
        Ok(Self {
            name: name.into(),
            role,
            width,
            training: Vec::new(),
            forecast: Vec::new(),
            forecast_uncertainty: Vec::new(),
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn set_training_values(&mut self, values: Vec<Vec<f64>>) -> Result<()> {
        Self::check_widths(self.width, &values)?;
        self.training = values;
        Ok(())
    }

    pub fn set_forecast_inputs(&mut self, values: Vec<Vec<f64>>) -> Result<()> {
        Self::check_widths(self.width, &values)?;
        self.forecast = values;
        Ok(())
    }

    pub fn forecast(&self) -> &[Vec<f64>] {
        &self.forecast
    }

    pub fn forecast_uncertainty(&self) -> &[Vec<f64>] {
        &self.forecast_uncertainty
    }

    fn check_widths(width: usize, values: &[Vec<f64>]) -> Result<()> {
        for row in values {
            if row.len() != width {
                return Err(Error::WidthMismatch {
                    left: width,
                    right: row.len(),
                });
            }
        }
        Ok(())
    }

    fn row_array(&self, source: &[Vec<f64>], row: usize) -> Result<Array2<f64>> {
        let values = source.get(row).ok_or_else(|| Error::RowCountMismatch {
            item: self.name.clone(),
            expected: row + 1,
            actual: source.len(),
        })?;
        Array2::from_shape_vec((1, self.width), values.clone())
            .map_err(|e| Error::Other(e.to_string()))
    }
}

impl ItemValues for RealArrayItem {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> Role {
        self.role
    }

    fn value_kind(&self) -> ValueKind {
        ValueKind::Real
    }

    fn column_count(&self) -> usize {
        self.width
    }

    fn num_training_values(&self) -> usize {
        self.training.len()
    }

    fn num_forecast_values(&self) -> usize {
        self.forecast.len()
    }

    fn training_values(&self, row: usize) -> Result<Array2<f64>> {
        self.row_array(&self.training, row)
    }

    fn forecast_values(&self, row: usize) -> Result<Array2<f64>> {
        self.row_array(&self.forecast, row)
    }

    fn set_forecast_values(
        &mut self,
        row: usize,
        values: &Array2<f64>,
        uncertainty: &Array2<f64>,
    ) -> Result<()> {
        if values.ncols() != self.width {
            return Err(Error::WidthMismatch {
                left: self.width,
                right: values.ncols(),
            });
        }
        grow_with(&mut self.forecast, row + 1, vec![f64::NAN; self.width]);
        grow_with(
            &mut self.forecast_uncertainty,
            row + 1,
            vec![f64::NAN; self.width],
        );
        self.forecast[row] = values.row(0).to_vec();
        self.forecast_uncertainty[row] = uncertainty.row(0).to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_real_item_streams() {
        let mut item = RealItem::new(Role::Input, "discharge");
        item.set_training_values(vec![1.0, 2.0, 3.0]);
        item.set_forecast_inputs(vec![4.0]);

        assert_eq!(item.num_training_values(), 3);
        assert_eq!(item.num_forecast_values(), 1);
        assert_eq!(item.training_values(1).unwrap()[(0, 0)], 2.0);
        assert!(item.training_values(3).is_err());
    }

    #[test]
    fn test_real_item_writeback_expands() {
        let mut item = RealItem::new(Role::Output, "stage");
        let values = Array2::from_elem((1, 1), 5.5);
        let unc = Array2::from_elem((1, 1), 0.1);
        item.set_forecast_values(2, &values, &unc).unwrap();

        assert_eq!(item.forecast().len(), 3);
        assert!(item.forecast()[0].is_nan());
        assert_eq!(item.forecast()[2], 5.5);
    }

    #[test]
    fn test_array_item_width_validation() {
        let mut item = RealArrayItem::new(Role::Input, "bands", 3).unwrap();
        assert!(item
            .set_training_values(vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0]])
            .is_err());
        assert!(item
            .set_training_values(vec![vec![1.0, 2.0, 3.0]])
            .is_ok());

        let row = item.training_values(0).unwrap();
        assert_eq!(row.shape(), &[1, 3]);
    }

    #[test]
    fn test_zero_width_rejected() {
        assert!(RealArrayItem::new(Role::Input, "empty", 0).is_err());
    }
}
