//! Audit trail of landscape changes.

use crate::tree::NodeId;

/// A landscape change on one branch.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    /// Time from the start of the branch
    pub time: f64,
    /// Fitness vector after the change
    pub fitness: Vec<f64>,
}

/// Landscape changes of one run, per branch (indexed by the child node).
///
/// Changes are always counted; fitness snapshots are only kept when
/// recording is enabled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeTracker {
    recording: bool,
    changes: Vec<Vec<ChangeRecord>>,
    count: usize,
}

impl ChangeTracker {
    pub fn new(num_nodes: usize, recording: bool) -> Self {
        Self {
            recording,
            changes: if recording {
                vec![Vec::new(); num_nodes]
            } else {
                Vec::new()
            },
            count: 0,
        }
    }

    /// Register a change on the branch leading to `node`.
    pub fn record(&mut self, node: NodeId, time: f64, fitness: &[f64]) {
        self.count += 1;
        if let Some(branch) = self.changes.get_mut(node.index()) {
            branch.push(ChangeRecord {
                time,
                fitness: fitness.to_vec(),
            });
        }
    }

    /// Recorded changes on the branch leading to `node`.
    pub fn changes_on(&self, node: NodeId) -> &[ChangeRecord] {
        self.changes.get(node.index()).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Change times on a branch as `[t1, t2]`.
    pub fn format_times(&self, node: NodeId) -> String {
        let times: Vec<f64> = self.changes_on(node).iter().map(|c| c.time).collect();
        format!("{times:?}")
    }

    /// Fitness snapshots on a branch as `{[f..]:[f..]}`, `{}` when none.
    pub fn format_fitnesses(&self, node: NodeId) -> String {
        let parts: Vec<String> = self
            .changes_on(node)
            .iter()
            .map(|c| format!("{:?}", c.fitness))
            .collect();
        format!("{{{}}}", parts.join(":"))
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Number of registered changes, including the initial landscape.
    pub fn count(&self) -> usize {
        self.count
    }
}
