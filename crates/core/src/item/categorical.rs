//! Categorical items and the label/class/index mappings they share

use std::collections::BTreeMap;

use ndarray::Array2;

use crate::error::{Error, Result};
use crate::item::{grow_with, ItemValues, Role, ValueKind};

/// Bidirectional mapping between category labels, integer class codes and
/// a dense index space.
///
/// Every observed label maps to exactly one class code. The dense index
/// space is contiguous over observed classes only (ascending code order)
/// and is what enters the numeric design/target matrices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryMap {
    codes_by_label: BTreeMap<String, i32>,
    labels_by_code: BTreeMap<i32, String>,
    code_by_index: Vec<i32>,
    index_by_code: BTreeMap<i32, usize>,
}

impl CategoryMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the mapping with explicit (label, code) pairs.
    ///
    /// Duplicate labels or codes are configuration errors.
    pub fn set_categories<S: AsRef<str>>(&mut self, categories: &[(S, i32)]) -> Result<()> {
        let mut codes_by_label = BTreeMap::new();
        let mut labels_by_code = BTreeMap::new();

        for (label, code) in categories {
            let label = label.as_ref().to_string();
            if codes_by_label.insert(label.clone(), *code).is_some() {
                return Err(Error::InvalidParameter {
                    name: "categories",
                    value: label,
                    reason: "duplicate label".into(),
                });
            }
            if labels_by_code.insert(*code, label.clone()).is_some() {
                return Err(Error::InvalidParameter {
                    name: "categories",
                    value: code.to_string(),
                    reason: "duplicate class code".into(),
                });
            }
        }

        self.codes_by_label = codes_by_label;
        self.labels_by_code = labels_by_code;
        self.rebuild_index();
        Ok(())
    }

    /// Class code for a label, registering the label under the next free
    /// code if unseen
    pub fn register_label(&mut self, label: &str) -> i32 {
        if let Some(&code) = self.codes_by_label.get(label) {
            return code;
        }
        let code = self
            .labels_by_code
            .keys()
            .next_back()
            .map(|&c| c + 1)
            .unwrap_or(0);
        self.codes_by_label.insert(label.to_string(), code);
        self.labels_by_code.insert(code, label.to_string());
        self.rebuild_index();
        code
    }

    /// Register a bare class code (label defaults to its decimal form)
    pub fn register_code(&mut self, code: i32) {
        if self.labels_by_code.contains_key(&code) {
            return;
        }
        let label = code.to_string();
        self.labels_by_code.insert(code, label.clone());
        self.codes_by_label.insert(label, code);
        self.rebuild_index();
    }

    pub fn code_for_label(&self, label: &str) -> Option<i32> {
        self.codes_by_label.get(label).copied()
    }

    pub fn label_for_code(&self, code: i32) -> Option<&str> {
        self.labels_by_code.get(&code).map(String::as_str)
    }

    pub fn index_for_code(&self, code: i32) -> Option<usize> {
        self.index_by_code.get(&code).copied()
    }

    pub fn code_for_index(&self, index: usize) -> Option<i32> {
        self.code_by_index.get(index).copied()
    }

    /// Number of observed classes
    pub fn num_classes(&self) -> usize {
        self.code_by_index.len()
    }

    /// Round a predicted index value to the nearest observed class index
    pub fn nearest_index(&self, value: f64) -> Option<usize> {
        if self.code_by_index.is_empty() || !value.is_finite() {
            return None;
        }
        let max = (self.code_by_index.len() - 1) as f64;
        Some(value.round().clamp(0.0, max) as usize)
    }

    fn rebuild_index(&mut self) {
        self.code_by_index = self.labels_by_code.keys().copied().collect();
        self.index_by_code = self
            .code_by_index
            .iter()
            .enumerate()
            .map(|(i, &c)| (c, i))
            .collect();
    }
}

/// A named categorical variable with scalar label values.
#[derive(Debug, Clone)]
pub struct CategoricalItem {
    name: String,
    role: Role,
    categories: CategoryMap,
    training: Vec<i32>,
    forecast: Vec<String>,
    forecast_uncertainty: Vec<f64>,
}

impl CategoricalItem {
    pub fn new(role: Role, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role,
            categories: CategoryMap::new(),
            training: Vec::new(),
            forecast: Vec::new(),
            forecast_uncertainty: Vec::new(),
        }
    }

    /// Replace the label/code mapping with explicit pairs
    pub fn set_categories<S: AsRef<str>>(&mut self, categories: &[(S, i32)]) -> Result<()> {
        self.categories.set_categories(categories)
    }

    /// Set the training stream from labels, registering unseen ones
    pub fn set_training_labels<S: AsRef<str>>(&mut self, labels: &[S]) {
        self.training = labels
            .iter()
            .map(|l| self.categories.register_label(l.as_ref()))
            .collect();
    }

    /// Set the forecast stream from labels.
    ///
    /// Labels are kept verbatim; an unseen label surfaces as an
    /// unresolved-category error at assembly time, not here.
    pub fn set_forecast_labels<S: AsRef<str>>(&mut self, labels: &[S]) {
        self.forecast = labels.iter().map(|l| l.as_ref().to_string()).collect();
    }

    pub fn categories(&self) -> &CategoryMap {
        &self.categories
    }

    /// Forecast labels, predictions included once regression has run
    pub fn forecast_labels(&self) -> &[String] {
        &self.forecast
    }

    pub fn forecast_uncertainty(&self) -> &[f64] {
        &self.forecast_uncertainty
    }
}

impl ItemValues for CategoricalItem {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> Role {
        self.role
    }

    fn value_kind(&self) -> ValueKind {
        ValueKind::Categorical
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
        let code = *self
            .training
            .get(row)
            .ok_or_else(|| Error::RowCountMismatch {
                item: self.name.clone(),
                expected: row + 1,
                actual: self.training.len(),
            })?;
        let index = self
            .categories
            .index_for_code(code)
            .ok_or_else(|| Error::UnresolvedCategory {
                item: self.name.clone(),
                row,
                label: code.to_string(),
            })?;
        Ok(Array2::from_elem((1, 1), index as f64))
    }

    fn forecast_values(&self, row: usize) -> Result<Array2<f64>> {
        let label = self
            .forecast
            .get(row)
            .ok_or_else(|| Error::RowCountMismatch {
                item: self.name.clone(),
                expected: row + 1,
                actual: self.forecast.len(),
            })?;
        let index = self
            .categories
            .code_for_label(label)
            .and_then(|code| self.categories.index_for_code(code))
            .ok_or_else(|| Error::UnresolvedCategory {
                item: self.name.clone(),
                row,
                label: label.clone(),
            })?;
        Ok(Array2::from_elem((1, 1), index as f64))
    }

    fn set_forecast_values(
        &mut self,
        row: usize,
        values: &Array2<f64>,
        uncertainty: &Array2<f64>,
    ) -> Result<()> {
        let predicted = values[(0, 0)];
        let label = self
            .categories
            .nearest_index(predicted)
            .and_then(|i| self.categories.code_for_index(i))
            .and_then(|c| self.categories.label_for_code(c))
            .ok_or_else(|| Error::UnresolvedCategory {
                item: self.name.clone(),
                row,
                label: format!("{predicted}"),
            })?
            .to_string();

        grow_with(&mut self.forecast, row + 1, String::new());
        grow_with(&mut self.forecast_uncertainty, row + 1, f64::NAN);
        self.forecast[row] = label;
        self.forecast_uncertainty[row] = uncertainty[(0, 0)];
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_map_contiguous_index() {
        let mut map = CategoryMap::new();
        map.set_categories(&[("forest", 10), ("water", 2), ("urban", 7)])
            .unwrap();

        // Dense index is contiguous over observed codes, ascending
        assert_eq!(map.num_classes(), 3);
        assert_eq!(map.index_for_code(2), Some(0));
        assert_eq!(map.index_for_code(7), Some(1));
        assert_eq!(map.index_for_code(10), Some(2));
        assert_eq!(map.code_for_index(2), Some(10));
    }

    #[test]
    fn test_duplicate_code_rejected() {
        let mut map = CategoryMap::new();
        let result = map.set_categories(&[("a", 1), ("b", 1)]);
        assert!(result.is_err());
    }

    #[test]
    fn test_register_label_is_idempotent() {
        let mut map = CategoryMap::new();
        let a = map.register_label("sand");
        let b = map.register_label("sand");
        assert_eq!(a, b);
        assert_eq!(map.num_classes(), 1);
    }

    #[test]
    fn test_training_values_dense_index() {
        let mut item = CategoricalItem::new(Role::Input, "landuse");
        item.set_training_labels(&["forest", "water", "forest"]);

        assert_eq!(item.num_training_values(), 3);
        assert_eq!(item.training_values(0).unwrap()[(0, 0)], 0.0);
        assert_eq!(item.training_values(1).unwrap()[(0, 0)], 1.0);
        assert_eq!(item.training_values(2).unwrap()[(0, 0)], 0.0);
    }

    #[test]
    fn test_unseen_forecast_label_errors() {
        let mut item = CategoricalItem::new(Role::Input, "landuse");
        item.set_training_labels(&["forest", "water"]);
        item.set_forecast_labels(&["swamp"]);

        match item.forecast_values(0) {
            Err(Error::UnresolvedCategory { label, .. }) => assert_eq!(label, "swamp"),
            other => panic!("expected UnresolvedCategory, got {other:?}"),
        }
    }

    #[test]
    fn test_prediction_writeback_rounds_to_class() {
        let mut item = CategoricalItem::new(Role::Output, "landuse");
        item.set_training_labels(&["forest", "water", "urban"]);

        let values = Array2::from_elem((1, 1), 1.4);
        let unc = Array2::from_elem((1, 1), 0.2);
        item.set_forecast_values(0, &values, &unc).unwrap();

        assert_eq!(item.forecast_labels()[0], "water");

        // Out-of-range predictions clamp to the observed index range
        let values = Array2::from_elem((1, 1), 9.0);
        item.set_forecast_values(1, &values, &unc).unwrap();
        assert_eq!(item.forecast_labels()[1], "urban");
    }
}
