//! N-dimensional binned histograms with explicit edges.
//!
//! Each axis carries `n` in-range bins `[edge[i], edge[i+1])` plus one
//! underflow and one overflow slot. Counts are stored row-major over the
//! extended (`n + 2`) shape, so merges are plain element-wise additions.
//!
//! Deserialization goes through the same checks as construction, so a
//! histogram read from disk always has well-formed axes and a matching
//! count vector.

use serde::{Deserialize, Serialize};

use crate::error::{ExecutionError, ValidationError};

/// One histogram axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawAxis")]
pub struct Axis {
    name: String,
    label: String,
    edges: Vec<f64>,
}

impl Axis {
    /// Axis with explicit, strictly increasing edges.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidAxis` for fewer than two edges, non-finite
    /// edges, or edges that do not increase strictly.
    pub fn edges(name: impl Into<String>, label: impl Into<String>, edges: Vec<f64>) -> Result<Self, ValidationError> {
        let name = name.into();
        let invalid = |reason: &str| ValidationError::InvalidAxis {
            axis: name.clone(),
            reason: reason.to_string(),
        };
        if edges.len() < 2 {
            return Err(invalid("needs at least two edges"));
        }
        if edges.iter().any(|e| !e.is_finite()) {
            return Err(invalid("edges must be finite"));
        }
        if edges.windows(2).any(|w| w[0] >= w[1]) {
            return Err(invalid("edges must increase strictly"));
        }
        Ok(Self {
            name,
            label: label.into(),
            edges,
        })
    }

    /// `bins` equal-width bins over `[low, high)`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidAxis` if `bins == 0` or the range is empty.
    pub fn regular(
        name: impl Into<String>,
        label: impl Into<String>,
        bins: usize,
        low: f64,
        high: f64,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        if bins == 0 {
            return Err(ValidationError::InvalidAxis {
                axis: name,
                reason: "needs at least one bin".to_string(),
            });
        }
        #[allow(clippy::cast_precision_loss)]
        let edges = (0..=bins)
            .map(|i| low + (high - low) * i as f64 / bins as f64)
            .collect();
        Self::edges(name, label, edges)
    }

    /// `bins` log-spaced bins from `10^low_exp` to `10^high_exp`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidAxis` if `bins == 0` or the range is empty.
    pub fn log(
        name: impl Into<String>,
        label: impl Into<String>,
        bins: usize,
        low_exp: f64,
        high_exp: f64,
    ) -> Result<Self, ValidationError> {
        let linear = Self::regular(name, label, bins, low_exp, high_exp)?;
        let edges = linear.edges.iter().map(|e| 10f64.powf(*e)).collect();
        Self::edges(linear.name, linear.label, edges)
    }

    /// Axis name, used for projections.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human-readable label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Bin edges.
    #[must_use]
    pub fn bin_edges(&self) -> &[f64] {
        &self.edges
    }

    /// Number of in-range bins.
    #[must_use]
    pub fn n_bins(&self) -> usize {
        self.edges.len() - 1
    }

    /// Bin midpoints.
    #[must_use]
    pub fn centers(&self) -> Vec<f64> {
        self.edges.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect()
    }

    /// Slot for `x`: 0 is underflow, `1..=n` the in-range bins, `n + 1`
    /// overflow. NaN lands in overflow.
    #[must_use]
    pub fn index(&self, x: f64) -> usize {
        let n = self.n_bins();
        if x.is_nan() || x >= self.edges[n] {
            return n + 1;
        }
        if x < self.edges[0] {
            return 0;
        }
        self.edges.partition_point(|e| *e <= x)
    }

    fn extent(&self) -> usize {
        self.n_bins() + 2
    }
}

#[derive(Deserialize)]
struct RawAxis {
    name: String,
    label: String,
    edges: Vec<f64>,
}

impl TryFrom<RawAxis> for Axis {
    type Error = ValidationError;

    fn try_from(raw: RawAxis) -> Result<Self, Self::Error> {
        Self::edges(raw.name, raw.label, raw.edges)
    }
}

/// A weighted N-dimensional histogram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawHistogram")]
pub struct Histogram {
    name: String,
    axes: Vec<Axis>,
    counts: Vec<f64>,
}

impl Histogram {
    /// Empty histogram over `axes`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidAxis` if there are no axes or two axes share a name.
    pub fn new(name: impl Into<String>, axes: Vec<Axis>) -> Result<Self, ValidationError> {
        let name = name.into();
        if axes.is_empty() {
            return Err(ValidationError::InvalidAxis {
                axis: name,
                reason: "histogram needs at least one axis".to_string(),
            });
        }
        for (i, axis) in axes.iter().enumerate() {
            if axes[..i].iter().any(|a| a.name == axis.name) {
                return Err(ValidationError::InvalidAxis {
                    axis: axis.name.clone(),
                    reason: "duplicate axis name".to_string(),
                });
            }
        }
        let size = axes.iter().map(Axis::extent).product();
        Ok(Self {
            name,
            axes,
            counts: vec![0.0; size],
        })
    }

    /// Metric name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Axes in storage order.
    #[must_use]
    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    /// Axis by name.
    #[must_use]
    pub fn axis(&self, name: &str) -> Option<&Axis> {
        self.axes.iter().find(|a| a.name == name)
    }

    /// Same axes, all counts zero.
    #[must_use]
    pub fn empty_like(&self) -> Self {
        Self {
            name: self.name.clone(),
            axes: self.axes.clone(),
            counts: vec![0.0; self.counts.len()],
        }
    }

    /// Adds `weight` at the point `values` (one coordinate per axis).
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::LengthMismatch` if `values` does not have one entry per axis.
    pub fn fill(&mut self, values: &[f64], weight: f64) -> Result<(), ValidationError> {
        if values.len() != self.axes.len() {
            return Err(ValidationError::LengthMismatch {
                field: self.name.clone(),
                expected: self.axes.len(),
                actual: values.len(),
            });
        }
        let mut flat = 0;
        for (axis, &x) in self.axes.iter().zip(values) {
            flat = flat * axis.extent() + axis.index(x);
        }
        self.counts[flat] += weight;
        Ok(())
    }

    /// Adds `other` bin by bin.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::IncompatibleAxes` unless both histograms share name and axes.
    pub fn merge(&mut self, other: &Self) -> Result<(), ExecutionError> {
        if self.name != other.name || self.axes != other.axes || self.counts.len() != other.counts.len() {
            return Err(ExecutionError::IncompatibleAxes {
                metric: self.name.clone(),
            });
        }
        for (a, b) in self.counts.iter_mut().zip(&other.counts) {
            *a += b;
        }
        Ok(())
    }

    /// Keeps the named axes (in the given order) and sums over every slot of the others,
    /// flow slots included.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::UnknownAxis` for a name the histogram does not have.
    pub fn project(&self, keep: &[&str]) -> Result<Self, ExecutionError> {
        let positions = keep
            .iter()
            .map(|name| {
                self.axes
                    .iter()
                    .position(|a| a.name == *name)
                    .ok_or_else(|| ExecutionError::UnknownAxis {
                        axis: (*name).to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let axes: Vec<Axis> = positions.iter().map(|&i| self.axes[i].clone()).collect();
        let mut projected = Self::new(self.name.clone(), axes).map_err(|_| ExecutionError::UnknownAxis {
            axis: keep.join(","),
        })?;

        let extents: Vec<usize> = self.axes.iter().map(Axis::extent).collect();
        let mut slot = vec![0usize; extents.len()];
        for &count in &self.counts {
            let mut flat = 0;
            for &i in &positions {
                flat = flat * extents[i] + slot[i];
            }
            projected.counts[flat] += count;

            for d in (0..slot.len()).rev() {
                slot[d] += 1;
                if slot[d] < extents[d] {
                    break;
                }
                slot[d] = 0;
            }
        }
        Ok(projected)
    }

    /// In-range counts, row-major, flow slots dropped.
    #[must_use]
    pub fn values(&self) -> Vec<f64> {
        let extents: Vec<usize> = self.axes.iter().map(Axis::extent).collect();
        let mut out = Vec::with_capacity(self.axes.iter().map(Axis::n_bins).product());
        let mut slot = vec![0usize; extents.len()];
        for &count in &self.counts {
            if slot.iter().zip(&extents).all(|(&s, &e)| s != 0 && s != e - 1) {
                out.push(count);
            }
            for d in (0..slot.len()).rev() {
                slot[d] += 1;
                if slot[d] < extents[d] {
                    break;
                }
                slot[d] = 0;
            }
        }
        out
    }

    /// Count of one in-range bin, zero-based per axis.
    #[must_use]
    pub fn bin(&self, indices: &[usize]) -> Option<f64> {
        if indices.len() != self.axes.len() {
            return None;
        }
        let mut flat = 0;
        for (axis, &i) in self.axes.iter().zip(indices) {
            if i >= axis.n_bins() {
                return None;
            }
            flat = flat * axis.extent() + i + 1;
        }
        Some(self.counts[flat])
    }

    /// Sum of all slots, flow included.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.counts.iter().sum()
    }
}

#[derive(Deserialize)]
struct RawHistogram {
    name: String,
    axes: Vec<Axis>,
    counts: Vec<f64>,
}

impl TryFrom<RawHistogram> for Histogram {
    type Error = ValidationError;

    fn try_from(raw: RawHistogram) -> Result<Self, Self::Error> {
        let mut histogram = Self::new(raw.name, raw.axes)?;
        if raw.counts.len() != histogram.counts.len() {
            return Err(ValidationError::LengthMismatch {
                field: format!("{}.counts", histogram.name),
                expected: histogram.counts.len(),
                actual: raw.counts.len(),
            });
        }
        histogram.counts = raw.counts;
        Ok(histogram)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn grid() -> Histogram {
        Histogram::new(
            "grid",
            vec![
                Axis::regular("x", "x", 2, 0.0, 2.0).unwrap(),
                Axis::regular("y", "y", 3, 0.0, 3.0).unwrap(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn index_places_flow_and_edges() {
        let axis = Axis::edges("p", "p", vec![0.0, 1.0, 10.0]).unwrap();
        assert_eq!(axis.index(-0.5), 0);
        assert_eq!(axis.index(0.0), 1);
        assert_eq!(axis.index(0.999), 1);
        assert_eq!(axis.index(1.0), 2);
        assert_eq!(axis.index(10.0), 3);
        assert_eq!(axis.index(f64::NAN), 3);
    }

    #[test]
    fn log_axis_spans_decades() {
        let axis = Axis::log("e", "e", 3, -1.0, 2.0).unwrap();
        let edges = axis.bin_edges();
        assert_eq!(edges.len(), 4);
        assert_relative_eq!(edges[0], 0.1, epsilon = 1e-12);
        assert_relative_eq!(edges[1], 1.0, epsilon = 1e-12);
        assert_relative_eq!(edges[3], 100.0, epsilon = 1e-9);
    }

    #[test]
    fn rejects_bad_axes() {
        assert!(Axis::edges("a", "a", vec![1.0]).is_err());
        assert!(Axis::edges("a", "a", vec![1.0, 1.0]).is_err());
        assert!(Axis::regular("a", "a", 0, 0.0, 1.0).is_err());
        let a = Axis::regular("a", "a", 1, 0.0, 1.0).unwrap();
        assert!(Histogram::new("h", vec![a.clone(), a]).is_err());
    }

    #[test]
    fn fill_and_read_bins() {
        let mut h = grid();
        h.fill(&[0.5, 2.5], 1.0).unwrap();
        h.fill(&[0.5, 2.5], 2.0).unwrap();
        h.fill(&[1.5, 0.0], 1.0).unwrap();
        h.fill(&[5.0, 0.0], 1.0).unwrap();
        assert_eq!(h.bin(&[0, 2]), Some(3.0));
        assert_eq!(h.bin(&[1, 0]), Some(1.0));
        assert_eq!(h.values(), vec![0.0, 0.0, 3.0, 1.0, 0.0, 0.0]);
        assert_relative_eq!(h.total(), 5.0);
        assert!(h.fill(&[0.5], 1.0).is_err());
    }

    #[test]
    fn merge_adds_and_checks_axes() {
        let mut a = grid();
        let mut b = grid();
        a.fill(&[0.5, 0.5], 1.0).unwrap();
        b.fill(&[0.5, 0.5], 2.0).unwrap();
        a.merge(&b).unwrap();
        assert_eq!(a.bin(&[0, 0]), Some(3.0));

        let other = Histogram::new("grid", vec![Axis::regular("x", "x", 2, 0.0, 2.0).unwrap()]).unwrap();
        assert!(matches!(a.merge(&other), Err(ExecutionError::IncompatibleAxes { .. })));
    }

    #[test]
    fn projection_sums_dropped_axes() {
        let mut h = grid();
        h.fill(&[0.5, 0.5], 1.0).unwrap();
        h.fill(&[0.5, 2.5], 1.0).unwrap();
        h.fill(&[0.5, 9.0], 1.0).unwrap();
        h.fill(&[1.5, 1.5], 4.0).unwrap();
        let x = h.project(&["x"]).unwrap();
        assert_eq!(x.values(), vec![3.0, 4.0]);

        let yx = h.project(&["y", "x"]).unwrap();
        assert_eq!(yx.axes()[0].name(), "y");
        assert_eq!(yx.bin(&[2, 0]), Some(1.0));
        assert_eq!(yx.bin(&[1, 1]), Some(4.0));

        assert!(matches!(h.project(&["z"]), Err(ExecutionError::UnknownAxis { .. })));
    }

    #[test]
    fn deserialize_checks_axes_and_counts() {
        let mut h = grid();
        h.fill(&[0.5, 1.5], 2.0).unwrap();
        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(serde_json::from_str::<Histogram>(&json).unwrap(), h);

        let no_edges = r#"{"name":"h","axes":[{"name":"x","label":"x","edges":[]}],"counts":[]}"#;
        assert!(serde_json::from_str::<Histogram>(no_edges).is_err());

        let short_counts = r#"{"name":"h","axes":[{"name":"x","label":"x","edges":[0.0,1.0,2.0,3.0]}],"counts":[]}"#;
        assert!(serde_json::from_str::<Histogram>(short_counts).is_err());

        let unordered = r#"{"name":"x","label":"x","edges":[2.0,1.0]}"#;
        assert!(serde_json::from_str::<Axis>(unordered).is_err());
    }
}
