//! The raw derivation tree handed over by the front end.

/// Nonterminals of the grammar; any other left-hand side is a terminal.
pub const NONTERMINALS: [&str; 17] = [
    "start",
    "dcl",
    "dcls",
    "expr",
    "factor",
    "lvalue",
    "procedure",
    "procedures",
    "main",
    "params",
    "paramlist",
    "statement",
    "statements",
    "term",
    "test",
    "type",
    "arglist",
];

pub fn is_nonterminal(symbol: &str) -> bool {
    NONTERMINALS.contains(&symbol)
}

/// Position of a node in its [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeId(usize);

/// One production application. Nonterminal nodes have exactly one child per
/// right-hand-side symbol; terminal nodes are leaves whose `rhs` holds the
/// lexeme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub lhs: String,
    pub rhs: Vec<String>,
    pub children: Vec<NodeId>,
    /// 1-based input line the production came from.
    pub line: usize,
}

impl Node {
    pub fn is_terminal(&self) -> bool {
        !is_nonterminal(&self.lhs)
    }

    /// The right-hand side as a slice of `&str`, for matching on alternatives.
    pub fn shape(&self) -> Vec<&str> {
        self.rhs.iter().map(String::as_str).collect()
    }

    /// The production as it appeared on its input line.
    pub fn rule(&self) -> String {
        if self.rhs.is_empty() {
            self.lhs.clone()
        } else {
            format!("{} {}", self.lhs, self.rhs.join(" "))
        }
    }
}

/// A derivation tree stored as a flat arena in input order, so the root is
/// the first node. Building and dropping it never recurse, however deep the
/// derivation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    /// Adds a node and returns its id.
    pub(crate) fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    pub(crate) fn new() -> Self {
        Self { nodes: vec![] }
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn root(&self) -> &Node {
        &self.nodes[0]
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// The `i`-th child of `n`.
    pub fn child(&self, n: &Node, i: usize) -> &Node {
        self.node(n.children[i])
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
