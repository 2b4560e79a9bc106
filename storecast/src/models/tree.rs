//! Regression trees grown leaf-wise on binned features

use crate::models::binning::{BinnedMatrix, FeatureBins};
use serde::{Deserialize, Serialize};

/// Splits whose gain does not exceed this are treated as no improvement
const MIN_GAIN: f64 = 1e-10;

/// A node of a [`RegressionTree`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreeNode {
    /// Values `<= threshold` (and NaN) go to `left`, the rest to `right`
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    /// Contribution of the tree for rows reaching this node
    Leaf { value: f64 },
}

/// A binary regression tree, root at index 0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<TreeNode>,
}

impl RegressionTree {
    /// A tree with a single leaf
    pub fn leaf(value: f64) -> Self {
        Self {
            nodes: vec![TreeNode::Leaf { value }],
        }
    }

    /// Output of the tree for one feature vector.
    ///
    /// The caller guarantees the vector covers every feature index used by
    /// the splits.
    pub fn predict(&self, features: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if features[*feature] > *threshold {
                        *right
                    } else {
                        *left
                    };
                }
            }
        }
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    pub fn num_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, TreeNode::Leaf { .. }))
            .count()
    }

    /// Largest feature index referenced by a split
    pub fn max_feature(&self) -> Option<usize> {
        self.nodes
            .iter()
            .filter_map(|n| match n {
                TreeNode::Split { feature, .. } => Some(*feature),
                TreeNode::Leaf { .. } => None,
            })
            .max()
    }
}

/// Shape limits for a single tree
#[derive(Debug, Clone, Copy)]
pub(crate) struct TreeParams {
    pub num_leaves: usize,
    pub min_data_in_leaf: usize,
    pub lambda_l2: f64,
    pub learning_rate: f64,
}

#[derive(Debug, Clone, Copy)]
struct SplitInfo {
    feature: usize,
    bin: usize,
    gain: f64,
    left_sum: f64,
}

#[derive(Debug)]
struct LeafCandidate {
    node: usize,
    rows: Vec<usize>,
    sum: f64,
    best: Option<SplitInfo>,
}

/// Fits one tree to residuals
pub(crate) struct TreeGrower<'a> {
    binned: &'a BinnedMatrix,
    bins: &'a [FeatureBins],
    params: TreeParams,
}

impl<'a> TreeGrower<'a> {
    pub fn new(binned: &'a BinnedMatrix, bins: &'a [FeatureBins], params: TreeParams) -> Self {
        Self {
            binned,
            bins,
            params,
        }
    }

    /// Grow a tree over `rows`, always splitting the leaf with the largest gain
    pub fn grow(&self, rows: Vec<usize>, residuals: &[f64]) -> RegressionTree {
        let mut nodes = vec![TreeNode::Leaf { value: 0.0 }];
        let root_sum: f64 = rows.iter().map(|&r| residuals[r]).sum();
        let mut leaves = vec![self.candidate(0, rows, root_sum, residuals)];

        while leaves.len() < self.params.num_leaves {
            let chosen = leaves
                .iter()
                .enumerate()
                .filter_map(|(i, leaf)| leaf.best.map(|split| (i, split)))
                .max_by(|a, b| a.1.gain.total_cmp(&b.1.gain));
            let Some((position, split)) = chosen else {
                break;
            };

            let leaf = leaves.swap_remove(position);
            let column = self.binned.column(split.feature);
            let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = leaf
                .rows
                .iter()
                .partition(|&&r| column[r] as usize <= split.bin);

            let left = nodes.len();
            let right = left + 1;
            nodes.push(TreeNode::Leaf { value: 0.0 });
            nodes.push(TreeNode::Leaf { value: 0.0 });
            nodes[leaf.node] = TreeNode::Split {
                feature: split.feature,
                threshold: self.bins[split.feature].threshold(split.bin),
                left,
                right,
            };

            leaves.push(self.candidate(left, left_rows, split.left_sum, residuals));
            leaves.push(self.candidate(right, right_rows, leaf.sum - split.left_sum, residuals));
        }

        for leaf in leaves {
            nodes[leaf.node] = TreeNode::Leaf {
                value: self.leaf_value(leaf.sum, leaf.rows.len()),
            };
        }

        RegressionTree { nodes }
    }

    fn leaf_value(&self, sum: f64, count: usize) -> f64 {
        let denominator = count as f64 + self.params.lambda_l2;
        if denominator <= 0.0 {
            return 0.0;
        }
        self.params.learning_rate * sum / denominator
    }

    fn candidate(&self, node: usize, rows: Vec<usize>, sum: f64, residuals: &[f64]) -> LeafCandidate {
        let best = self.best_split(&rows, sum, residuals);
        LeafCandidate {
            node,
            rows,
            sum,
            best,
        }
    }

    fn score(&self, sum: f64, count: usize) -> f64 {
        sum * sum / (count as f64 + self.params.lambda_l2)
    }

    fn best_split(&self, rows: &[usize], sum: f64, residuals: &[f64]) -> Option<SplitInfo> {
        let n = rows.len();
        let min_leaf = self.params.min_data_in_leaf.max(1);
        if n < 2 * min_leaf {
            return None;
        }

        let parent = self.score(sum, n);
        let mut best: Option<SplitInfo> = None;

        for feature in 0..self.binned.n_features() {
            let n_bins = self.bins[feature].n_bins();
            if n_bins < 2 {
                continue;
            }

            let column = self.binned.column(feature);
            let mut sums = vec![0.0; n_bins];
            let mut counts = vec![0usize; n_bins];
            for &r in rows {
                let b = column[r] as usize;
                sums[b] += residuals[r];
                counts[b] += 1;
            }

            let mut left_sum = 0.0;
            let mut left_count = 0;
            for bin in 0..n_bins - 1 {
                left_sum += sums[bin];
                left_count += counts[bin];
                if left_count < min_leaf {
                    continue;
                }
                let right_count = n - left_count;
                if right_count < min_leaf {
                    break;
                }

                let gain = self.score(left_sum, left_count)
                    + self.score(sum - left_sum, right_count)
                    - parent;
                if gain > MIN_GAIN && best.map_or(true, |b| gain > b.gain) {
                    best = Some(SplitInfo {
                        feature,
                        bin,
                        gain,
                        left_sum,
                    });
                }
            }
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn grow(rows: &[Vec<f64>], residuals: &[f64], params: TreeParams) -> RegressionTree {
        let bins: Vec<FeatureBins> = (0..rows[0].len())
            .map(|j| {
                let column: Vec<f64> = rows.iter().map(|r| r[j]).collect();
                FeatureBins::fit(&column, 255)
            })
            .collect();
        let binned = BinnedMatrix::new(rows, &bins).unwrap();
        TreeGrower::new(&binned, &bins, params).grow((0..rows.len()).collect(), residuals)
    }

    fn params(num_leaves: usize) -> TreeParams {
        TreeParams {
            num_leaves,
            min_data_in_leaf: 1,
            lambda_l2: 0.0,
            learning_rate: 1.0,
        }
    }

    #[test]
    fn test_single_split_recovers_step() {
        let rows: Vec<Vec<f64>> = (0..6).map(|i| vec![f64::from(i)]).collect();
        let residuals = vec![-1.0, -1.0, -1.0, 1.0, 1.0, 1.0];

        let tree = grow(&rows, &residuals, params(2));
        assert_eq!(tree.num_leaves(), 2);
        assert_relative_eq!(tree.predict(&[0.0]), -1.0);
        assert_relative_eq!(tree.predict(&[2.4]), -1.0);
        assert_relative_eq!(tree.predict(&[2.6]), 1.0);
        assert_relative_eq!(tree.predict(&[f64::NAN]), -1.0);
    }

    #[test]
    fn test_leaf_count_limit() {
        let rows: Vec<Vec<f64>> = (0..8).map(|i| vec![f64::from(i)]).collect();
        let residuals: Vec<f64> = (0..8).map(|i| f64::from(i * i)).collect();

        let tree = grow(&rows, &residuals, params(3));
        assert_eq!(tree.num_leaves(), 3);
        assert_eq!(tree.nodes().len(), 5);
    }

    #[test]
    fn test_constant_residuals_do_not_split() {
        let rows: Vec<Vec<f64>> = (0..4).map(|i| vec![f64::from(i)]).collect();
        let tree = grow(&rows, &[2.0; 4], params(8));
        assert_eq!(tree.num_leaves(), 1);
        assert_relative_eq!(tree.predict(&[1.0]), 2.0);
        assert_eq!(tree.max_feature(), None);
    }

    #[test]
    fn test_min_data_in_leaf() {
        let rows: Vec<Vec<f64>> = (0..4).map(|i| vec![f64::from(i)]).collect();
        let residuals = vec![10.0, 0.0, 0.0, 0.0];
        let tree = grow(
            &rows,
            &residuals,
            TreeParams {
                min_data_in_leaf: 2,
                ..params(4)
            },
        );
        // the outlier cannot be isolated in a leaf of its own
        assert_eq!(tree.num_leaves(), 2);
        assert_relative_eq!(tree.predict(&[0.0]), 5.0);
    }

    #[test]
    fn test_learning_rate_and_l2_shrink_leaves() {
        let rows: Vec<Vec<f64>> = (0..4).map(|i| vec![f64::from(i)]).collect();
        let tree = grow(
            &rows,
            &[4.0; 4],
            TreeParams {
                num_leaves: 1,
                min_data_in_leaf: 1,
                lambda_l2: 4.0,
                learning_rate: 0.5,
            },
        );
        // 0.5 * 16 / (4 + 4)
        assert_relative_eq!(tree.predict(&[0.0]), 1.0);
    }

    #[test]
    fn test_leaf_constructor() {
        let tree = RegressionTree::leaf(3.5);
        assert_eq!(tree.num_leaves(), 1);
        assert_eq!(tree.predict(&[]), 3.5);
    }
}
