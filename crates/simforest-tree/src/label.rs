use std::fmt;

/// A flat cluster assignment label. Wraps a zero-based cluster index.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct ClusterLabel(usize);

impl ClusterLabel {
    /// Create a new cluster label from a zero-based index.
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Return the zero-based cluster index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ClusterLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Renumber arbitrary group keys to labels `0..` in order of first appearance.
pub(crate) fn relabel_by_first_appearance(keys: &[usize]) -> Vec<ClusterLabel> {
    let mut seen: std::collections::HashMap<usize, usize> = std::collections::HashMap::new();
    keys.iter()
        .map(|&key| {
            let next = seen.len();
            ClusterLabel::new(*seen.entry(key).or_insert(next))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{ClusterLabel, relabel_by_first_appearance};

    #[test]
    fn roundtrip_and_display() {
        let label = ClusterLabel::new(7);
        assert_eq!(label.index(), 7);
        assert_eq!(format!("{label}"), "7");
    }

    #[test]
    fn ordering() {
        assert!(ClusterLabel::new(1) < ClusterLabel::new(5));
    }

    #[test]
    fn relabel_follows_first_appearance() {
        let labels = relabel_by_first_appearance(&[9, 9, 4, 9, 11, 4]);
        let idx: Vec<usize> = labels.iter().map(|l| l.index()).collect();
        assert_eq!(idx, vec![0, 0, 1, 0, 2, 1]);
    }
}
