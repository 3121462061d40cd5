// Dependency graph over integer-indexed nodes

/// DFS state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Directed graph where an edge `a -> b` means `a` depends on `b`
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    edges: Vec<Vec<usize>>,
}

/// Result of a full depth-first traversal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Traversal {
    /// Nodes in the order they were first reached
    pub discovery: Vec<usize>,
    /// Nodes in finish order: dependencies before dependents when acyclic
    pub finish: Vec<usize>,
    /// Whether each node lies on a cycle (including self-loops)
    pub on_cycle: Vec<bool>,
}

impl Traversal {
    pub fn has_cycle(&self) -> bool {
        self.on_cycle.iter().any(|c| *c)
    }

    /// Cyclic nodes in discovery order
    pub fn cyclic_nodes(&self) -> Vec<usize> {
        self.discovery
            .iter()
            .copied()
            .filter(|n| self.on_cycle[*n])
            .collect()
    }

    /// Position of each node in discovery order
    pub fn discovery_rank(&self) -> Vec<usize> {
        let mut rank = vec![0; self.on_cycle.len()];
        for (pos, node) in self.discovery.iter().enumerate() {
            rank[*node] = pos;
        }
        rank
    }
}

impl DependencyGraph {
    pub fn new(nodes: usize) -> Self {
        DependencyGraph {
            edges: vec![Vec::new(); nodes],
        }
    }

    pub fn add_edge(&mut self, from: usize, to: usize) {
        if !self.edges[from].contains(&to) {
            self.edges[from].push(to);
        }
    }

    pub fn dependencies(&self, node: usize) -> &[usize] {
        &self.edges[node]
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Iterative depth-first traversal from every node in index order,
    /// following edges in insertion order.
    ///
    /// Cycle membership comes from strongly connected components
    /// (Tarjan lowlinks), so a node that closes a cycle through an
    /// already finished node is still reported.
    pub fn traverse(&self) -> Traversal {
        let mut dfs = Dfs::new(self);
        for root in 0..self.edges.len() {
            if dfs.color[root] == Color::White {
                dfs.run(root);
            }
        }
        dfs.traversal
    }
}

struct Dfs<'g> {
    graph: &'g DependencyGraph,
    color: Vec<Color>,
    index: Vec<usize>,
    low: Vec<usize>,
    on_stack: Vec<bool>,
    component_stack: Vec<usize>,
    /// (node, next edge to follow)
    call_stack: Vec<(usize, usize)>,
    next_index: usize,
    traversal: Traversal,
}

impl<'g> Dfs<'g> {
    fn new(graph: &'g DependencyGraph) -> Self {
        let n = graph.len();
        Dfs {
            graph,
            color: vec![Color::White; n],
            index: vec![0; n],
            low: vec![0; n],
            on_stack: vec![false; n],
            component_stack: Vec::new(),
            call_stack: Vec::new(),
            next_index: 0,
            traversal: Traversal {
                discovery: Vec::with_capacity(n),
                finish: Vec::with_capacity(n),
                on_cycle: vec![false; n],
            },
        }
    }

    fn enter(&mut self, node: usize) {
        self.color[node] = Color::Gray;
        self.index[node] = self.next_index;
        self.low[node] = self.next_index;
        self.next_index += 1;
        self.on_stack[node] = true;
        self.component_stack.push(node);
        self.call_stack.push((node, 0));
        self.traversal.discovery.push(node);
    }

    fn run(&mut self, root: usize) {
        self.enter(root);

        while let Some(&(node, edge)) = self.call_stack.last() {
            if let Some(&dep) = self.graph.edges[node].get(edge) {
                if let Some(top) = self.call_stack.last_mut() {
                    top.1 += 1;
                }
                match self.color[dep] {
                    Color::White => self.enter(dep),
                    _ if self.on_stack[dep] => {
                        self.low[node] = self.low[node].min(self.index[dep]);
                    }
                    _ => {}
                }
                continue;
            }

            self.call_stack.pop();
            self.color[node] = Color::Black;
            self.traversal.finish.push(node);
            if let Some(&(parent, _)) = self.call_stack.last() {
                self.low[parent] = self.low[parent].min(self.low[node]);
            }

            if self.low[node] == self.index[node] {
                self.close_component(node);
            }
        }
    }

    fn close_component(&mut self, root: usize) {
        let mut component = Vec::new();
        while let Some(member) = self.component_stack.pop() {
            self.on_stack[member] = false;
            component.push(member);
            if member == root {
                break;
            }
        }

        let cyclic = component.len() > 1 || self.graph.edges[root].contains(&root);
        if cyclic {
            for member in component {
                self.traversal.on_cycle[member] = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(n: usize, edges: &[(usize, usize)]) -> DependencyGraph {
        let mut g = DependencyGraph::new(n);
        for &(a, b) in edges {
            g.add_edge(a, b);
        }
        g
    }

    #[test]
    fn test_acyclic_finish_order() {
        // 0 -> 1 -> 2, 0 -> 2
        let t = graph(3, &[(0, 1), (1, 2), (0, 2)]).traverse();
        assert!(!t.has_cycle());
        assert_eq!(t.discovery, vec![0, 1, 2]);
        assert_eq!(t.finish, vec![2, 1, 0]);
    }

    #[test]
    fn test_three_cycle() {
        let t = graph(4, &[(0, 1), (1, 2), (2, 0), (3, 0)]).traverse();
        assert_eq!(t.cyclic_nodes(), vec![0, 1, 2]);
        assert!(!t.on_cycle[3]);
    }

    #[test]
    fn test_cycle_closed_through_finished_node() {
        // 0 <-> 1, and 0 -> 2 -> 1: node 2 reaches the cycle through a node
        // that has already finished
        let t = graph(3, &[(0, 1), (1, 0), (0, 2), (2, 1)]).traverse();
        assert_eq!(t.cyclic_nodes(), vec![0, 1, 2]);
    }

    #[test]
    fn test_self_loop() {
        let t = graph(2, &[(1, 1)]).traverse();
        assert_eq!(t.cyclic_nodes(), vec![1]);
    }

    #[test]
    fn test_deep_chain_does_not_recurse() {
        let n = 100_000;
        let edges: Vec<_> = (0..n - 1).map(|i| (i, i + 1)).collect();
        let t = graph(n, &edges).traverse();
        assert_eq!(t.finish.first(), Some(&(n - 1)));
        assert!(!t.has_cycle());
    }
}
