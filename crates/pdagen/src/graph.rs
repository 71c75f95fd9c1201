//! A directed graph whose transitions carry typed, ordered actions.

use crate::{
    grammar::{Grammar, NonterminalID, RuleID, SymbolID, TerminalID},
    util::display_fn,
};
use std::fmt;

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct NodeIndex {
    raw: usize,
}
impl NodeIndex {
    #[inline]
    pub const fn from_raw(raw: usize) -> Self {
        Self { raw }
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.raw
    }
}
impl fmt::Debug for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S#{:03}", self.raw)
    }
}

/// The payload associated with a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    /// The position `stage` within the right-hand side of `rule`.
    RuleStage { rule: RuleID, stage: u16 },
    /// The entry point used to derive the nonterminal.
    Start(NonterminalID),
    /// The point from which every rule of the nonterminal is entered.
    Head(NonterminalID),
    /// Reached after the nonterminal is completely derived from its start.
    Return(NonterminalID),
    /// The sorted set of NPDA states this DPDA state was derived from.
    DpdaState(Vec<NodeIndex>),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TransitionKind {
    Epsilon,
    Shift(SymbolID),
    Reduce(RuleID),
    Return(NonterminalID),
    PopStack(u16),
    DiscardLookahead,
    InsertLookaheadError,
    ErrorPanic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub kind: TransitionKind,
    /// The lookahead sequence required to take this transition.
    /// An empty sequence means the transition is unconditional.
    pub lookahead: Vec<TerminalID>,
    pub target: Option<NodeIndex>,
    pub label: Option<String>,
}

impl Transition {
    pub fn new(kind: TransitionKind, target: Option<NodeIndex>) -> Self {
        Self {
            kind,
            lookahead: vec![],
            target,
            label: None,
        }
    }

    pub fn keyed(mut self, lookahead: Vec<TerminalID>) -> Self {
        self.lookahead = lookahead;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Whether this transition is taken when no other transition applies.
    pub fn is_default(&self) -> bool {
        self.lookahead.is_empty()
            && matches!(
                self.kind,
                TransitionKind::Reduce(..)
                    | TransitionKind::Return(..)
                    | TransitionKind::ErrorPanic
            )
    }

    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(move |f| {
            match self.kind {
                TransitionKind::Epsilon => f.write_str("epsilon")?,
                TransitionKind::Shift(symbol) => write!(f, "shift({})", g.symbol_name(symbol))?,
                TransitionKind::Reduce(rule) => {
                    write!(f, "reduce({})", g.rule(rule).display(g))?
                }
                TransitionKind::Return(n) => write!(f, "return({})", g.nonterminals[&n])?,
                TransitionKind::PopStack(n) => write!(f, "pop-stack({})", n)?,
                TransitionKind::DiscardLookahead => f.write_str("discard-lookahead")?,
                TransitionKind::InsertLookaheadError => f.write_str("insert-lookahead-error")?,
                TransitionKind::ErrorPanic => f.write_str("error-panic")?,
            }
            if !self.lookahead.is_empty() {
                f.write_str(" [")?;
                for (i, t) in self.lookahead.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}", g.terminals[t])?;
                }
                f.write_str("]")?;
            }
            if let Some(target) = self.target {
                write!(f, " -> {:?}", target)?;
            }
            if let Some(label) = &self.label {
                write!(f, " ({})", label)?;
            }
            Ok(())
        })
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub data: NodeData,
    transitions: Vec<Transition>,
}
impl Node {
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions[..]
    }
}

#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<Node>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, data: NodeData) -> NodeIndex {
        let index = NodeIndex {
            raw: self.nodes.len(),
        };
        self.nodes.push(Node {
            data,
            transitions: vec![],
        });
        index
    }

    pub fn add_transition(&mut self, node: NodeIndex, transition: Transition) {
        debug_assert!(transition.target.map_or(true, |t| t.raw < self.nodes.len()));
        self.nodes[node.raw].transitions.push(transition);
    }

    pub fn node(&self, index: NodeIndex) -> &Node {
        &self.nodes[index.raw]
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeIndex, &Node)> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .map(|(raw, node)| (NodeIndex { raw }, node))
    }

    pub fn transitions(&self, index: NodeIndex) -> &[Transition] {
        self.node(index).transitions()
    }

    pub fn data(&self, index: NodeIndex) -> &NodeData {
        &self.node(index).data
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(move |f| {
            for (index, node) in self.nodes() {
                write!(f, "{:?}: ", index)?;
                match &node.data {
                    NodeData::RuleStage { rule, stage } => {
                        let rule = g.rule(*rule);
                        write!(f, "{} := ", g.nonterminals[&rule.left()])?;
                        for (i, symbol) in rule.right().iter().enumerate() {
                            if i == *stage as usize {
                                f.write_str(". ")?;
                            }
                            write!(f, "{} ", g.symbol_name(*symbol))?;
                        }
                        if *stage as usize == rule.right().len() {
                            f.write_str(".")?;
                        }
                    }
                    NodeData::Start(n) => write!(f, "start({})", g.nonterminals[n])?,
                    NodeData::Head(n) => write!(f, "head({})", g.nonterminals[n])?,
                    NodeData::Return(n) => write!(f, "return({})", g.nonterminals[n])?,
                    NodeData::DpdaState(states) => write!(f, "{:?}", states)?,
                }
                writeln!(f)?;
                for transition in node.transitions() {
                    writeln!(f, "  - {}", transition.display(g))?;
                }
            }
            Ok(())
        })
    }
}
