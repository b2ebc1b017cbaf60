//! Majority threshold arithmetic

/// Minimum number of acks that certifies a phase: `floor(n/2) + 1`.
///
/// `total_nodes` is the full peer-set size, the proposer's own node
/// included; the same rule applies to both phases.
pub fn majority(total_nodes: usize) -> usize {
    total_nodes / 2 + 1
}
