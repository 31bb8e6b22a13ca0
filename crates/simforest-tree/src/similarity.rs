//! Pluggable similarity functions used to build split projections.

use std::fmt;

use crate::error::SimForestError;

/// A scalar similarity between two feature vectors.
///
/// Implementations must be deterministic. Symmetry and the metric axioms are
/// not required: a split only ever compares `sim(x, q) - sim(x, p)` across
/// samples, so any real-valued score works.
pub trait Similarity: Send + Sync {
    /// Return the similarity of `a` and `b`. Both slices have equal length.
    fn similarity(&self, a: &[f64], b: &[f64]) -> f64;

    /// Check the function's own parameters. Called once before any fit.
    ///
    /// # Errors
    ///
    /// Implementations return a validation error for parameters that would
    /// produce non-finite projections. The default accepts everything.
    fn validate(&self) -> Result<(), SimForestError> {
        Ok(())
    }
}

/// Built-in similarity functions.
///
/// Serializable, so a forest using a `Kernel` can be saved and loaded.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub enum Kernel {
    /// Dot product `Σ a_i b_i`.
    #[default]
    Dot,
    /// Gaussian RBF `exp(-gamma · ‖a - b‖²)`.
    Rbf {
        /// Inverse length scale; must be positive for a meaningful kernel.
        gamma: f64,
    },
    /// Cosine similarity. Zero when either vector has zero norm.
    Cosine,
    /// Negated squared Euclidean distance `-‖a - b‖²`.
    NegSquaredEuclidean,
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn squared_euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

impl Similarity for Kernel {
    fn similarity(&self, a: &[f64], b: &[f64]) -> f64 {
        match self {
            Kernel::Dot => dot(a, b),
            Kernel::Rbf { gamma } => (-gamma * squared_euclidean(a, b)).exp(),
            Kernel::Cosine => {
                let norm = dot(a, a).sqrt() * dot(b, b).sqrt();
                if norm == 0.0 { 0.0 } else { dot(a, b) / norm }
            }
            Kernel::NegSquaredEuclidean => -squared_euclidean(a, b),
        }
    }

    fn validate(&self) -> Result<(), SimForestError> {
        match *self {
            Kernel::Rbf { gamma } if !(gamma > 0.0 && gamma.is_finite()) => {
                Err(SimForestError::InvalidGamma { gamma })
            }
            _ => Ok(()),
        }
    }
}

/// Adapter that turns a closure into a [`Similarity`].
///
/// ```
/// use simforest_tree::{FnSimilarity, Similarity};
///
/// let manhattan = FnSimilarity::new(|a: &[f64], b: &[f64]| {
///     -a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum::<f64>()
/// });
/// assert_eq!(manhattan.similarity(&[0.0, 0.0], &[1.0, 2.0]), -3.0);
/// ```
#[derive(Clone, Copy)]
pub struct FnSimilarity<F>(F);

impl<F> FnSimilarity<F>
where
    F: Fn(&[f64], &[f64]) -> f64 + Send + Sync,
{
    /// Wrap a similarity closure.
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> Similarity for FnSimilarity<F>
where
    F: Fn(&[f64], &[f64]) -> f64 + Send + Sync,
{
    fn similarity(&self, a: &[f64], b: &[f64]) -> f64 {
        (self.0)(a, b)
    }
}

impl<F> fmt::Debug for FnSimilarity<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnSimilarity(..)")
    }
}
