//! Substitution hit statistics.

use crate::tree::{NodeId, Tree};

/// Summary of the substitutions on one branch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BranchStats {
    /// Substitutions per site
    pub avg_total_hits: f64,
    /// Fraction of sites hit at least once
    pub avg_observed_hits: f64,
    /// Substitutions beyond the first at any site
    pub non_observed_hits: u64,
    /// Sites hit more than once
    pub multihit_positions: usize,
}

/// Per-branch, per-site substitution counts.
///
/// Counts from several runs are laid end to end with [`merge`](Self::merge),
/// so per-branch figures average over every run's sites.
#[derive(Debug, Clone, PartialEq)]
pub struct SubstitutionStats {
    sequence_length: usize,
    per_branch: Vec<Vec<u32>>,
    per_site: Vec<u64>,
    total: u64,
    runs: usize,
}

impl SubstitutionStats {
    pub fn new(num_nodes: usize, sequence_length: usize) -> Self {
        Self {
            sequence_length,
            per_branch: vec![vec![0; sequence_length]; num_nodes],
            per_site: vec![0; sequence_length],
            total: 0,
            runs: 1,
        }
    }

    /// Count a substitution at `site` on the branch leading to `node`.
    pub fn register(&mut self, node: NodeId, site: usize) {
        self.per_branch[node.index()][site] += 1;
        self.per_site[site] += 1;
        self.total += 1;
    }

    /// Append another run's counts after this one's sites.
    ///
    /// Sites line up with the merged sequences, where every run's sequence
    /// follows the previous one. Runs may have different lengths.
    pub fn merge(&mut self, other: &Self) {
        for (mine, theirs) in self.per_branch.iter_mut().zip(&other.per_branch) {
            mine.extend_from_slice(theirs);
        }
        self.per_site.extend_from_slice(&other.per_site);
        self.sequence_length += other.sequence_length;
        self.total += other.total;
        self.runs += other.runs;
    }

    pub fn branch(&self, node: NodeId) -> BranchStats {
        let hits = &self.per_branch[node.index()];
        let all: u64 = hits.iter().map(|&h| u64::from(h)).sum();
        let observed = hits.iter().filter(|&&h| h > 0).count();
        let multihit_positions = hits.iter().filter(|&&h| h > 1).count();
        let length = self.sequence_length.max(1) as f64;
        BranchStats {
            avg_total_hits: all as f64 / length,
            avg_observed_hits: observed as f64 / length,
            non_observed_hits: all - observed as u64,
            multihit_positions,
        }
    }

    /// Total substitutions per site over all branches.
    pub fn per_site(&self) -> &[u64] {
        &self.per_site
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Number of runs these counts cover.
    pub fn runs(&self) -> usize {
        self.runs
    }

    /// Number of sites covered, summed over merged runs.
    pub fn sequence_length(&self) -> usize {
        self.sequence_length
    }

    /// Average substitutions per site per tree.
    pub fn average_per_tree(&self) -> f64 {
        self.total as f64 / self.sequence_length.max(1) as f64
    }

    /// Tab-separated report, branches sorted by length.
    pub fn report(&self, tree: &Tree) -> String {
        let mut branches: Vec<NodeId> = tree.ids().filter(|&id| tree.parent(id).is_some()).collect();
        branches.sort_by(|a, b| tree.branch_length(*a).total_cmp(&tree.branch_length(*b)));

        let mut out = format!(
            "average substitutions per tree: {}\n\
             branch\tlength\tavg_total_hits\tavg_observed_hits\tnum_nonobserved_hits\tnum_multihit_positions\n",
            self.average_per_tree()
        );
        for id in branches {
            let s = self.branch(id);
            out.push_str(&format!(
                "{}\t{}\t{}\t{}\t{}\t{}\n",
                tree.name(id),
                tree.branch_length(id),
                s.avg_total_hits,
                s.avg_observed_hits,
                s.non_observed_hits,
                s.multihit_positions
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_branch_summary() {
        let tree = Tree::from_newick("(A:1,B:2)R;").unwrap();
        let a = tree.find("A").unwrap();
        let mut stats = SubstitutionStats::new(tree.len(), 4);
        for site in [0, 0, 0, 2] {
            stats.register(a, site);
        }
        let s = stats.branch(a);
        assert_eq!(s.avg_total_hits, 1.0);
        assert_eq!(s.avg_observed_hits, 0.5);
        assert_eq!(s.non_observed_hits, 2);
        assert_eq!(s.multihit_positions, 1);
        assert_eq!(stats.per_site(), &[3, 0, 1, 0]);
        assert_eq!(stats.branch(tree.find("B").unwrap()).avg_total_hits, 0.0);
    }

    #[test]
    fn test_merge_and_report() {
        let tree = Tree::from_newick("(A:1,B:2)R;").unwrap();
        let b = tree.find("B").unwrap();
        let mut first = SubstitutionStats::new(tree.len(), 2);
        first.register(b, 1);
        let mut second = SubstitutionStats::new(tree.len(), 2);
        second.register(b, 1);
        second.register(b, 0);
        first.merge(&second);
        assert_eq!(first.total(), 3);
        assert_eq!(first.runs(), 2);
        assert_eq!(first.sequence_length(), 4);
        assert_eq!(first.per_site(), &[0, 1, 1, 1]);
        assert_eq!(first.average_per_tree(), 0.75);

        // A site hit once in each run is not a multiple hit.
        let s = first.branch(b);
        assert_eq!(s.avg_total_hits, 0.75);
        assert_eq!(s.avg_observed_hits, 0.75);
        assert_eq!(s.non_observed_hits, 0);
        assert_eq!(s.multihit_positions, 0);

        let report = first.report(&tree);
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[2].starts_with("A\t1\t"));
        assert!(lines[3].starts_with("B\t2\t"));
    }

    #[test]
    fn test_merge_sections_of_different_lengths() {
        let tree = Tree::from_newick("(A:1,B:2)R;").unwrap();
        let a = tree.find("A").unwrap();
        let b = tree.find("B").unwrap();
        let mut short = SubstitutionStats::new(tree.len(), 2);
        short.register(a, 0);
        let mut long = SubstitutionStats::new(tree.len(), 6);
        for site in [0, 3, 5, 5] {
            long.register(b, site);
        }
        short.merge(&long);

        assert_eq!(short.sequence_length(), 8);
        assert_eq!(short.per_site().len(), 8);
        assert_eq!(short.per_site().iter().sum::<u64>(), short.total());
        assert_eq!(short.per_site(), &[1, 0, 1, 0, 0, 1, 0, 2]);
        assert_eq!(short.branch(a).avg_total_hits, 0.125);
        assert_eq!(short.branch(b).avg_total_hits, 0.5);
        assert_eq!(short.branch(b).multihit_positions, 1);
        assert_eq!(short.average_per_tree(), 0.625);
    }
}
