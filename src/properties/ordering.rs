use std::collections::BTreeSet;

/// Topologically sort `num_nodes` nodes subject to `edges`, where `(a, b)` means that `a` must
/// come before `b`.
///
/// Whenever several nodes are ready at the same time, the smallest index is taken first, so the
/// result is deterministic and keeps the input order wherever the edges allow it.
///
/// On failure, returns the nodes that could not be ordered (in increasing order). These are the
/// nodes on a cycle together with the nodes that depend on one.
pub(crate) fn topological_order(num_nodes: usize, edges: &BTreeSet<(usize, usize)>) -> Result<Vec<usize>, Vec<usize>> {
    let mut indegree = vec![0usize; num_nodes];
    let mut successors = vec![Vec::new(); num_nodes];
    for &(before, after) in edges {
        assert!(before < num_nodes && after < num_nodes, "Internal error: edge out of bounds");
        if before != after {
            indegree[after] += 1;
            successors[before].push(after);
        }
    }

    let mut ready: BTreeSet<usize> = (0..num_nodes)
        .filter(|&node| indegree[node] == 0)
        .collect();
    let mut ordered = Vec::with_capacity(num_nodes);

    while let Some(node) = ready.pop_first() {
        ordered.push(node);
        for &successor in &successors[node] {
            indegree[successor] -= 1;
            if indegree[successor] == 0 {
                ready.insert(successor);
            }
        }
    }

    if ordered.len() == num_nodes {
        Ok(ordered)
    } else {
        Err((0..num_nodes)
            .filter(|&node| indegree[node] > 0)
            .collect())
    }
}
