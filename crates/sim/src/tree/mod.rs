//! Rooted phylogenetic trees.
//!
//! Nodes live in an arena and are addressed by [`NodeId`]. A tree is
//! immutable once built; depth and height are computed at construction so
//! the simulation can read them freely from any number of runs.

mod newick;

use crate::errors::TreeError;
use std::collections::HashMap;
use std::fmt;

/// Index of a node in its [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Id of the node at a pre-order position.
    pub fn from_index(index: usize) -> Self {
        Self(index)
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// One tree node.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    name: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    /// Length of the branch from the parent; zero for the root
    branch_length: f64,
    /// Distance from the root
    depth: f64,
    /// Longest distance down to a leaf
    height: f64,
}

impl Node {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn branch_length(&self) -> f64 {
        self.branch_length
    }

    pub fn depth(&self) -> f64 {
        self.depth
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Immutable rooted tree. Nodes are stored in pre-order, root first.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    nodes: Vec<Node>,
    by_name: HashMap<String, NodeId>,
}

impl Tree {
    /// Parse a tree from Newick text.
    ///
    /// Unlabelled nodes are named `node<N>` with `N` their pre-order index
    /// (suffixed further if a label already uses that name).
    ///
    /// # Errors
    /// Syntax errors, duplicate labels and negative or non-finite branch
    /// lengths.
    pub fn from_newick(text: &str) -> Result<Self, TreeError> {
        let parsed = newick::parse(text)?;

        // Flatten to pre-order, remembering each node's parent.
        let mut flat: Vec<(Option<usize>, newick::ParsedNode)> = Vec::new();
        let mut stack = vec![(None, parsed)];
        while let Some((parent, mut node)) = stack.pop() {
            let index = flat.len();
            let children = std::mem::take(&mut node.children);
            for child in children.into_iter().rev() {
                stack.push((Some(index), child));
            }
            flat.push((parent, node));
        }

        let labels: Vec<&str> = flat.iter().filter_map(|(_, n)| n.name.as_deref()).collect();
        let mut generated = Vec::with_capacity(flat.len());
        for (index, (_, node)) in flat.iter().enumerate() {
            let name = match &node.name {
                Some(name) => name.clone(),
                None => {
                    let mut name = format!("node{index}");
                    while labels.contains(&name.as_str()) {
                        name.push('_');
                    }
                    name
                }
            };
            generated.push(name);
        }

        let mut nodes: Vec<Node> = Vec::with_capacity(flat.len());
        let mut by_name = HashMap::with_capacity(flat.len());
        for (index, ((parent, parsed), name)) in flat.into_iter().zip(generated).enumerate() {
            let branch_length = match (parent, parsed.length) {
                (None, _) | (_, None) => 0.0,
                (Some(_), Some(length)) => length,
            };
            if !branch_length.is_finite() || branch_length < 0.0 {
                return Err(TreeError::InvalidLength {
                    name,
                    length: branch_length,
                });
            }
            if by_name.insert(name.clone(), NodeId(index)).is_some() {
                return Err(TreeError::DuplicateName(name));
            }
            let depth = match parent {
                Some(p) => nodes[p].depth + branch_length,
                None => 0.0,
            };
            if let Some(p) = parent {
                nodes[p].children.push(NodeId(index));
            }
            nodes.push(Node {
                name,
                parent: parent.map(NodeId),
                children: Vec::new(),
                branch_length,
                depth,
                height: 0.0,
            });
        }

        // Children follow their parents in pre-order, so a reverse sweep
        // sees every child before its parent.
        for index in (0..nodes.len()).rev() {
            let height = nodes[index]
                .children
                .iter()
                .map(|c| nodes[c.0].height + nodes[c.0].branch_length)
                .fold(0.0, f64::max);
            nodes[index].height = height;
        }

        Ok(Self { nodes, by_name })
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn name(&self, id: NodeId) -> &str {
        &self.nodes[id.0].name
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn branch_length(&self, id: NodeId) -> f64 {
        self.nodes[id.0].branch_length
    }

    /// Look a node up by name.
    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(name).copied()
    }

    /// Longest root-to-leaf distance.
    pub fn height(&self) -> f64 {
        self.nodes[0].height
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false for a parsed tree.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All node ids in pre-order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(NodeId)
    }

    /// Leaf ids in pre-order.
    pub fn leaves(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.ids().filter(|id| self.nodes[id.0].is_leaf())
    }
}

impl fmt::Display for Tree {
    /// Newick rendering with every name and non-root branch length.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn write_node(tree: &Tree, id: NodeId, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let children = tree.children(id);
            if !children.is_empty() {
                write!(f, "(")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write_node(tree, *child, f)?;
                }
                write!(f, ")")?;
            }
            write!(f, "'{}'", tree.name(id).replace('\'', "''"))?;
            if tree.parent(id).is_some() {
                write!(f, ":{}", tree.branch_length(id))?;
            }
            Ok(())
        }
        write_node(self, self.root(), f)?;
        write!(f, ";")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_and_height() {
        let tree = Tree::from_newick("((A:1,B:2)X:0.5,C:1)R;").unwrap();
        assert_eq!(tree.len(), 5);
        assert_eq!(tree.name(tree.root()), "R");
        let b = tree.find("B").unwrap();
        assert_eq!(tree.node(b).depth(), 2.5);
        let x = tree.find("X").unwrap();
        assert_eq!(tree.node(x).height(), 2.0);
        assert_eq!(tree.height(), 2.5);
        assert_eq!(tree.parent(b), Some(x));
    }

    #[test]
    fn test_preorder_and_leaves() {
        let tree = Tree::from_newick("((A,B)X,C)R;").unwrap();
        let names: Vec<&str> = tree.ids().map(|id| tree.name(id)).collect();
        assert_eq!(names, vec!["R", "X", "A", "B", "C"]);
        let leaves: Vec<&str> = tree.leaves().map(|id| tree.name(id)).collect();
        assert_eq!(leaves, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_generated_names() {
        let tree = Tree::from_newick("((A:1,B:1):1,node0:1);").unwrap();
        assert_eq!(tree.name(tree.root()), "node0_");
        assert_eq!(tree.name(NodeId(1)), "node1");
        assert!(tree.find("node0").is_some());
    }

    #[test]
    fn test_structural_errors() {
        assert_eq!(
            Tree::from_newick("(A:1,A:1);"),
            Err(TreeError::DuplicateName("A".to_string()))
        );
        assert!(matches!(
            Tree::from_newick("(A:-1,B:1);"),
            Err(TreeError::InvalidLength { .. })
        ));
    }

    #[test]
    fn test_root_length_is_ignored() {
        let tree = Tree::from_newick("(A:1,B:1)R:7;").unwrap();
        assert_eq!(tree.branch_length(tree.root()), 0.0);
        assert_eq!(tree.height(), 1.0);
    }

    #[test]
    fn test_display_round_trip() {
        let tree = Tree::from_newick("((A:1,B:2)X:0.5,C:1)R;").unwrap();
        let again = Tree::from_newick(&tree.to_string()).unwrap();
        assert_eq!(tree, again);
    }
}
