//! Construction of the nondeterministic pushdown automaton.

use crate::{
    config::Config,
    grammar::{Grammar, NonterminalID, Rule, RuleID, SymbolID, TerminalID, TerminalSet},
    graph::{Graph, NodeData, NodeIndex, Transition, TransitionKind},
    types::Map,
};

/// The entry nodes derived for a nonterminal.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct NonterminalNodes {
    pub start: NodeIndex,
    pub head: NodeIndex,
    pub ret: NodeIndex,
}

/// The nondeterministic pushdown automaton that recognizes every parse
/// configuration of a grammar.
#[derive(Debug)]
pub struct Npda<'g> {
    grammar: &'g Grammar,
    graph: Graph,
    nonterminals: Map<NonterminalID, NonterminalNodes>,
    callers: Map<NonterminalID, Vec<NodeIndex>>,
}

impl<'g> Npda<'g> {
    pub fn grammar(&self) -> &'g Grammar {
        self.grammar
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn nodes_of(&self, n: NonterminalID) -> Option<&NonterminalNodes> {
        self.nonterminals.get(&n)
    }

    /// Iterate over the start nodes, in the order of nonterminal definitions.
    pub fn starts(&self) -> impl Iterator<Item = (NonterminalID, NodeIndex)> + '_ {
        self.nonterminals.iter().map(|(n, nodes)| (*n, nodes.start))
    }

    /// The nodes that have a transition shifting the nonterminal `n`.
    pub fn callers(&self, n: NonterminalID) -> &[NodeIndex] {
        self.callers.get(&n).map_or(&[], |callers| &callers[..])
    }
}

/// Build the NPDA of the specified grammar.
#[tracing::instrument(skip_all)]
pub fn build<'g>(grammar: &'g Grammar, config: &Config) -> Npda<'g> {
    let mut cx = BuildContext {
        grammar,
        config,
        graph: Graph::new(),
        memo: Map::default(),
    };
    for n in grammar.nonterminals.keys() {
        if *n == NonterminalID::NONE {
            continue;
        }
        cx.nonterminal(*n);
    }

    let mut callers = Map::<NonterminalID, Vec<NodeIndex>>::default();
    for (index, node) in cx.graph.nodes() {
        for transition in node.transitions() {
            if let TransitionKind::Shift(SymbolID::N(n)) = transition.kind {
                callers.entry(n).or_default().push(index);
            }
        }
    }

    tracing::trace!(nodes = cx.graph.len(), "NPDA constructed");

    Npda {
        grammar,
        graph: cx.graph,
        nonterminals: cx.memo,
        callers,
    }
}

struct BuildContext<'g, 'c> {
    grammar: &'g Grammar,
    config: &'c Config,
    graph: Graph,
    memo: Map<NonterminalID, NonterminalNodes>,
}

impl BuildContext<'_, '_> {
    fn nonterminal(&mut self, n: NonterminalID) -> NonterminalNodes {
        if let Some(nodes) = self.memo.get(&n) {
            return *nodes;
        }

        let nodes = NonterminalNodes {
            start: self.graph.add_node(NodeData::Start(n)),
            head: self.graph.add_node(NodeData::Head(n)),
            ret: self.graph.add_node(NodeData::Return(n)),
        };
        // register before expanding rules so that recursive references
        // find the nodes above.
        self.memo.insert(n, nodes);

        self.graph.add_transition(
            nodes.start,
            Transition::new(TransitionKind::Epsilon, Some(nodes.head)),
        );
        self.graph.add_transition(
            nodes.start,
            Transition::new(TransitionKind::Shift(SymbolID::N(n)), Some(nodes.ret)),
        );
        self.graph
            .add_transition(nodes.ret, Transition::new(TransitionKind::Return(n), None));

        let grammar = self.grammar;
        for rule in grammar.rules_of(n) {
            let entry = self.rule(rule);
            self.graph.add_transition(
                nodes.head,
                Transition::new(TransitionKind::Epsilon, Some(entry)),
            );
        }

        nodes
    }

    fn rule(&mut self, rule: &Rule) -> NodeIndex {
        let len = rule.right().len();
        let stages: Vec<NodeIndex> = (0..=len)
            .map(|stage| {
                self.graph.add_node(NodeData::RuleStage {
                    rule: rule.id(),
                    stage: stage as u16,
                })
            })
            .collect();

        let recovers = |i: usize| {
            rule.is_error_until_lookahead() && rule.right()[i] == SymbolID::T(TerminalID::ERROR)
        };

        for (i, symbol) in rule.right().iter().enumerate() {
            let node = stages[i];
            let next = stages[i + 1];
            self.graph.add_transition(
                node,
                Transition::new(TransitionKind::Shift(*symbol), Some(next)),
            );

            match *symbol {
                SymbolID::T(..) if recovers(i) => {
                    if i > 0 {
                        let depth = if self.config.is_minimal_npda() { i } else { i + 1 };
                        self.graph.add_transition(
                            node,
                            Transition::new(TransitionKind::PopStack(depth as u16), None)
                                .keyed(vec![TerminalID::END]),
                        );
                    }
                    self.graph.add_transition(
                        node,
                        Transition::new(TransitionKind::InsertLookaheadError, None),
                    );
                }
                SymbolID::T(..) => (),
                SymbolID::N(m) => {
                    if i > 0 || m != rule.left() {
                        let head = self.nonterminal(m).head;
                        self.graph
                            .add_transition(node, Transition::new(TransitionKind::Epsilon, Some(head)));
                    }
                }
            }

            if i > 0 && recovers(i - 1) {
                self.graph.add_transition(
                    node,
                    Transition::new(TransitionKind::DiscardLookahead, None),
                );
            }
        }

        self.rule_end(rule, stages[len], len > 0 && recovers(len - 1));

        stages[0]
    }

    fn rule_end(&mut self, rule: &Rule, node: NodeIndex, recovering: bool) {
        let reduce = TransitionKind::Reduce(rule.id());
        let mut keyed = TerminalSet::default();
        let mut add_keyed = |graph: &mut Graph, kind: TransitionKind, terminals: &[TerminalID]| {
            for &t in terminals {
                if keyed.insert(t) {
                    graph.add_transition(node, Transition::new(kind, None).keyed(vec![t]));
                }
            }
        };

        match rule.lookahead() {
            None if !recovering => {
                self.graph.add_transition(node, Transition::new(reduce, None));
            }
            None => {
                add_keyed(&mut self.graph, reduce, &[TerminalID::END]);
                self.graph
                    .add_transition(node, Transition::new(TransitionKind::DiscardLookahead, None));
            }
            Some(directive) => match (directive.inverted, recovering) {
                (false, false) => {
                    add_keyed(&mut self.graph, reduce, &directive.terminals);
                }
                (true, false) => {
                    add_keyed(&mut self.graph, TransitionKind::ErrorPanic, &directive.terminals);
                    self.graph.add_transition(node, Transition::new(reduce, None));
                }
                (false, true) => {
                    add_keyed(&mut self.graph, reduce, &directive.terminals);
                    self.graph.add_transition(
                        node,
                        Transition::new(TransitionKind::DiscardLookahead, None),
                    );
                }
                (true, true) => {
                    add_keyed(
                        &mut self.graph,
                        TransitionKind::DiscardLookahead,
                        &directive.terminals,
                    );
                    self.graph.add_transition(node, Transition::new(reduce, None));
                }
            },
        }
    }
}

/// Return the rule and stage of an NPDA node, if it belongs to a rule.
pub(crate) fn rule_stage(graph: &Graph, node: NodeIndex) -> Option<(RuleID, u16)> {
    match graph.data(node) {
        NodeData::RuleStage { rule, stage } => Some((*rule, *stage)),
        _ => None,
    }
}
