//! Per-run metric history.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ordered map from metric name to per-epoch values, produced once per
/// training run and reduced read-only afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct History {
    series: BTreeMap<String, Vec<f32>>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, metric: impl Into<String>, value: f32) {
        self.series.entry(metric.into()).or_default().push(value);
    }

    pub fn get(&self, metric: &str) -> Option<&[f32]> {
        self.series.get(metric).map(Vec::as_slice)
    }

    pub fn value_at(&self, metric: &str, epoch: usize) -> Option<f32> {
        self.get(metric).and_then(|series| series.get(epoch)).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Epoch count of the longest recorded series.
    pub fn epochs(&self) -> usize {
        self.series.values().map(Vec::len).max().unwrap_or(0)
    }

    /// Index of the first maximum of the named series.
    pub fn best_epoch(&self, metric: &str) -> Option<usize> {
        let series = self.series.get(metric)?;
        let mut best: Option<(usize, f32)> = None;
        for (epoch, &value) in series.iter().enumerate() {
            match best {
                Some((_, top)) if value <= top => {}
                _ => best = Some((epoch, value)),
            }
        }
        best.map(|(epoch, _)| epoch)
    }

    /// Key of a scale-parameterized metric variant, e.g. `val_lossC4.0`.
    pub fn crop_key(base: &str, scale: f32) -> String {
        format!("{base}C{scale:.1}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn best_epoch_is_the_argmax() {
        let mut history = History::new();
        for value in [0.1, 0.5, 0.3] {
            history.push("val_dice", value);
        }
        assert_eq!(history.best_epoch("val_dice"), Some(1));
    }

    #[test]
    fn best_epoch_ties_resolve_to_the_first_maximum() {
        let mut history = History::new();
        for value in [0.4, 0.7, 0.7, 0.2] {
            history.push("val_dice", value);
        }
        assert_eq!(history.best_epoch("val_dice"), Some(1));
    }

    #[test]
    fn best_epoch_of_a_missing_or_empty_series_is_none() {
        let history = History::new();
        assert_eq!(history.best_epoch("val_dice"), None);
    }

    #[test]
    fn crop_keys_carry_one_decimal() {
        assert_eq!(History::crop_key("val_loss", 4.0), "val_lossC4.0");
        assert_eq!(History::crop_key("val_di", 2.5), "val_diC2.5");
    }

    #[test]
    fn push_appends_in_epoch_order() {
        let mut history = History::new();
        history.push("val_loss", 0.9);
        history.push("val_loss", 0.8);
        assert_eq!(history.get("val_loss"), Some([0.9, 0.8].as_slice()));
        assert_eq!(history.value_at("val_loss", 1), Some(0.8));
        assert_eq!(history.epochs(), 2);
    }
}
