use anyhow::{Context, Result};
use selva_sim::simulation::loader::load_tree;
use std::path::Path;

/// Print every node with its depth and height, then a summary.
pub fn show_tree(path: &Path) -> Result<()> {
    let tree = load_tree(path).with_context(|| format!("Failed to load tree {}", path.display()))?;

    println!("🌳 Tree: {}", path.display());
    println!("{}", "-".repeat(60));
    println!("{:<20} {:>12} {:>12} {:>12}", "node", "branch", "depth", "height");
    for id in tree.ids() {
        let node = tree.node(id);
        let marker = if node.is_leaf() { "" } else { " *" };
        println!(
            "{:<20} {:>12.6} {:>12.6} {:>12.6}",
            format!("{}{marker}", node.name()),
            node.branch_length(),
            node.depth(),
            node.height()
        );
    }
    println!("{}", "-".repeat(60));

    let leaves: Vec<&str> = tree.leaves().map(|id| tree.name(id)).collect();
    println!("  Nodes: {}", tree.len());
    println!("  Leaves: {} ({})", leaves.len(), leaves.join(", "));
    println!("  Height: {}", tree.height());
    println!("  Newick: {tree}");
    Ok(())
}
