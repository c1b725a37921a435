//! Reads production lines into a derivation [`Tree`].

use pest::Parser;
use pest_derive::Parser;

use crate::error::ReadError;
use crate::tree::{is_nonterminal, Node, NodeId, Tree};

#[derive(Parser)]
#[grammar = "wlp4i.pest"]
struct ProductionParser;

/// A single input line split into symbols.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Production {
    pub line: usize,
    pub lhs: String,
    pub rhs: Vec<String>,
}

pub fn parse_productions(src: &str) -> Result<Vec<Production>, ReadError> {
    let mut pairs = ProductionParser::parse(Rule::file, src).map_err(|e| {
        let (line, col) = match e.line_col {
            pest::error::LineColLocation::Pos((l, c)) => (l, c),
            pest::error::LineColLocation::Span((l, c), _) => (l, c),
        };
        ReadError::Syntax(format!("line {line}, column {col}: {e}"))
    })?;
    let file = pairs.next().ok_or(ReadError::Empty)?;

    let mut out = vec![];
    for p in file.into_inner() {
        if p.as_rule() != Rule::production {
            continue;
        }
        let (line, _) = p.line_col();
        let mut symbols = p.into_inner().map(|s| s.as_str().to_string());
        let Some(lhs) = symbols.next() else {
            continue;
        };
        out.push(Production {
            line,
            lhs,
            rhs: symbols.collect(),
        });
    }
    Ok(out)
}

/// Builds the derivation tree: a nonterminal consumes one subtree per
/// right-hand-side symbol, a terminal consumes nothing further.
///
/// Productions arrive in preorder, so the tree is built with an explicit
/// stack of nodes still waiting for children.
pub fn read_tree(src: &str) -> Result<Tree, ReadError> {
    let productions = parse_productions(src)?;
    log::debug!("read {} productions", productions.len());

    let mut tree = Tree::new();
    // Open nonterminals with the number of children each still needs.
    let mut open: Vec<(NodeId, usize)> = vec![];
    for p in productions {
        while matches!(open.last(), Some(&(_, 0))) {
            open.pop();
        }
        let parent = match open.last_mut() {
            Some((id, missing)) => {
                *missing -= 1;
                Some(*id)
            }
            None if tree.is_empty() => None,
            None => return Err(ReadError::TrailingInput { line: p.line }),
        };

        let terminal = !is_nonterminal(&p.lhs);
        if terminal && p.rhs.len() != 1 {
            return Err(ReadError::BadTerminal {
                kind: p.lhs,
                line: p.line,
            });
        }
        let arity = if terminal { 0 } else { p.rhs.len() };
        let id = tree.push(Node {
            lhs: p.lhs,
            rhs: p.rhs,
            children: Vec::with_capacity(arity),
            line: p.line,
        });
        if let Some(parent) = parent {
            tree.node_mut(parent).children.push(id);
        }
        if arity > 0 {
            open.push((id, arity));
        }
    }

    if tree.is_empty() {
        return Err(ReadError::Empty);
    }
    if let Some(&(id, _)) = open.iter().rev().find(|(_, missing)| *missing > 0) {
        let n = tree.node(id);
        return Err(ReadError::UnexpectedEof {
            lhs: n.lhs.clone(),
            line: n.line,
        });
    }
    log::debug!("built a tree of {} nodes", tree.len());
    Ok(tree)
}
