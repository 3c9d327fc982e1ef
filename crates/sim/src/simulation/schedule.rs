//! Landscape changes scheduled at given branches and times.
//!
//! The schedule file is plain text, one change per line:
//!
//! ```text
//! # node   time-from-branch-start   [fitness...]
//! X        0.25
//! A        0.1                      0.5 1.0 0.0 2.0
//! ```
//!
//! Blank lines and lines starting with `#` are ignored.

use crate::errors::InputError;
use crate::tree::{NodeId, Tree};
use std::collections::HashMap;
use std::path::Path;

/// One scheduled landscape change.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledChange {
    /// Time from the start of the branch
    pub time: f64,
    /// Fitness vector handed to the change, if given
    pub fitness: Option<Vec<f64>>,
}

/// Scheduled changes grouped by the node the branch leads to, time-ordered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schedule {
    by_node: HashMap<NodeId, Vec<ScheduledChange>>,
}

impl Schedule {
    /// Parse schedule text against a tree.
    ///
    /// # Arguments
    /// * `text` - File content
    /// * `source` - Path used in error messages
    /// * `tree` - Tree whose node names and branch lengths the entries refer to
    /// * `alphabet_size` - Required length of fitness vectors
    ///
    /// # Errors
    /// Unknown nodes, the root, times outside `[0, branch length)`,
    /// unparsable numbers and fitness vectors of the wrong length.
    pub fn parse(
        text: &str,
        source: &Path,
        tree: &Tree,
        alphabet_size: usize,
    ) -> Result<Self, InputError> {
        let mut by_node: HashMap<NodeId, Vec<ScheduledChange>> = HashMap::new();

        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let at = |reason: String| {
                InputError::parse(source, format!("line {}: {reason}", number + 1))
            };

            let mut fields = line.split_whitespace();
            let name = fields.next().ok_or_else(|| at("missing node name".into()))?;
            let node = tree
                .find(name)
                .ok_or_else(|| at(format!("unknown node '{name}'")))?;
            if tree.parent(node).is_none() {
                return Err(at(format!("'{name}' is the root and has no branch")));
            }

            let time_text = fields.next().ok_or_else(|| at("missing time".into()))?;
            let time: f64 = time_text
                .parse()
                .map_err(|_| at(format!("invalid time '{time_text}'")))?;
            let length = tree.branch_length(node);
            if !(0.0..length).contains(&time) {
                return Err(at(format!(
                    "time {time} is outside the branch to '{name}' of length {length}"
                )));
            }

            let values = fields
                .map(|v| {
                    v.parse::<f64>()
                        .map_err(|_| at(format!("invalid fitness value '{v}'")))
                })
                .collect::<Result<Vec<f64>, _>>()?;
            let fitness = if values.is_empty() {
                None
            } else if values.len() != alphabet_size {
                return Err(at(format!(
                    "fitness vector has {} values, expected {alphabet_size}",
                    values.len()
                )));
            } else {
                Some(values)
            };

            by_node
                .entry(node)
                .or_default()
                .push(ScheduledChange { time, fitness });
        }

        for changes in by_node.values_mut() {
            changes.sort_by(|a, b| a.time.total_cmp(&b.time));
        }
        Ok(Self { by_node })
    }

    /// Changes on the branch leading to `node`, in time order.
    pub fn changes_on(&self, node: NodeId) -> &[ScheduledChange] {
        self.by_node.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total number of scheduled changes.
    pub fn len(&self) -> usize {
        self.by_node.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_node.is_empty()
    }

    /// All scheduled changes, grouped by branch.
    pub fn iter(&self) -> impl Iterator<Item = &ScheduledChange> + '_ {
        self.by_node.values().flatten()
    }

    /// Whether every entry carries a fitness vector.
    pub fn all_have_fitness(&self) -> bool {
        self.iter().all(|change| change.fitness.is_some())
    }
}
