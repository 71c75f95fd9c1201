//! Determinization of the NPDA.

use crate::{
    config::Config,
    grammar::{NonterminalID, RuleID, SymbolID, TerminalID},
    graph::{Graph, NodeData, NodeIndex, Transition, TransitionKind},
    npda::Npda,
    simulator::{Action, Simulator, Step},
    types::{Map, Queue, Set},
};

/// The deterministic pushdown automaton derived from an NPDA.
#[derive(Debug)]
pub struct Dpda {
    graph: Graph,
    starts: Map<NonterminalID, NodeIndex>,
    lookahead: usize,
    conflicts: Vec<ReduceConflict>,
}

impl Dpda {
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// The state from which the specified nonterminal is parsed.
    pub fn start(&self, n: NonterminalID) -> Option<NodeIndex> {
        self.starts.get(&n).copied()
    }

    pub fn starts(&self) -> impl Iterator<Item = (NonterminalID, NodeIndex)> + '_ {
        self.starts.iter().map(|(n, node)| (*n, *node))
    }

    /// The number of lookahead tokens required by the automaton, i.e. the `k`
    /// of LALR(k).
    pub fn lookahead(&self) -> usize {
        self.lookahead
    }

    /// The reduce/reduce conflicts settled by rule order rather than by
    /// precedence.
    pub fn conflicts(&self) -> &[ReduceConflict] {
        &self.conflicts
    }
}

/// A reduce/reduce conflict between rules of the same precedence, where the
/// rule defined first was kept.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ReduceConflict {
    pub state: NodeIndex,
    pub winner: RuleID,
    pub loser: RuleID,
}

#[derive(Debug, thiserror::Error)]
pub enum DpdaError {
    #[error("unresolved conflict in state {state:?} with lookahead {lookahead:?}")]
    UnresolvedConflict {
        state: Vec<NodeIndex>,
        lookahead: Vec<TerminalID>,
    },
}

/// Compute the DPDA of the specified NPDA.
#[tracing::instrument(skip_all)]
pub fn determinize(npda: &Npda<'_>, config: &Config) -> Result<Dpda, DpdaError> {
    let mut cx = Determinizer {
        npda,
        config,
        graph: Graph::new(),
        memo: Map::default(),
        queue: Queue::default(),
        lookahead: 0,
        conflicts: Set::default(),
    };

    let mut starts = Map::default();
    for (n, start) in npda.starts() {
        let node = cx.state(vec![start]);
        starts.insert(n, node);
    }

    while let Some(node) = cx.queue.pop() {
        cx.expand(node)?;
    }

    tracing::debug!(
        states = cx.graph.len(),
        lookahead = cx.lookahead,
        conflicts = cx.conflicts.len(),
        "DPDA constructed"
    );

    Ok(Dpda {
        graph: cx.graph,
        starts,
        lookahead: cx.lookahead,
        conflicts: cx.conflicts.into_iter().collect(),
    })
}

struct Determinizer<'n, 'g, 'c> {
    npda: &'n Npda<'g>,
    config: &'c Config,
    graph: Graph,
    memo: Map<Vec<NodeIndex>, NodeIndex>,
    queue: Queue<NodeIndex>,
    lookahead: usize,
    conflicts: Set<ReduceConflict>,
}

impl<'n, 'g> Determinizer<'n, 'g, '_> {
    fn state(&mut self, mut kernel: Vec<NodeIndex>) -> NodeIndex {
        kernel.sort();
        kernel.dedup();
        if let Some(node) = self.memo.get(&kernel) {
            return *node;
        }
        let node = self.graph.add_node(NodeData::DpdaState(kernel.clone()));
        self.memo.insert(kernel, node);
        self.queue.push(node);
        node
    }

    fn expand(&mut self, node: NodeIndex) -> Result<(), DpdaError> {
        let kernel = match self.graph.data(node) {
            NodeData::DpdaState(kernel) => kernel.clone(),
            data => unreachable!("unexpected DPDA node: {:?}", data),
        };

        let mut base = Simulator::with_states(self.npda, kernel.iter().copied());
        base.run(&[]);
        self.record_conflicts(node, &base);
        let default = base.default_action();
        tracing::trace!(?node, ?kernel, ?default, "expand state");

        let kind = match default {
            Action::Reduce(rule) => TransitionKind::Reduce(rule),
            Action::Return(n) => TransitionKind::Return(n),
            Action::Shift | Action::ErrorPanic => TransitionKind::ErrorPanic,
        };
        self.graph.add_transition(node, Transition::new(kind, None));

        let mut seq = vec![];
        self.explore(node, &kernel, &base, &base, default, &mut seq)?;

        for n in base.shiftable_nonterminals() {
            let mut next = base.clone();
            next.shift_nonterminal(n);
            let target = self.state(next.state());
            self.graph.add_transition(
                node,
                Transition::new(TransitionKind::Shift(SymbolID::N(n)), Some(target)),
            );
        }

        self.pass_through(node, &kernel, &base);

        Ok(())
    }

    // Feed every candidate token to the simulation, extending the lookahead
    // sequence while the outcome is still undetermined.
    fn explore(
        &mut self,
        node: NodeIndex,
        kernel: &[NodeIndex],
        base: &Simulator<'n, 'g>,
        sim: &Simulator<'n, 'g>,
        default: Action,
        seq: &mut Vec<TerminalID>,
    ) -> Result<(), DpdaError> {
        for t in sim.lookahead_candidates().iter() {
            let mut fork = sim.clone();
            fork.run(&[t]);
            self.record_conflicts(node, &fork);
            seq.push(t);

            match fork.outcome() {
                None if t == TerminalID::END || seq.len() >= self.config.lookahead_limit() => {
                    return Err(DpdaError::UnresolvedConflict {
                        state: kernel.to_vec(),
                        lookahead: seq.clone(),
                    });
                }
                None => self.explore(node, kernel, base, &fork, default, seq)?,
                Some(action) if action == default => (),
                Some(action) => self.emit(node, base, action, seq.clone()),
            }

            seq.pop();
        }
        Ok(())
    }

    fn record_conflicts(&mut self, node: NodeIndex, sim: &Simulator<'n, 'g>) {
        let g = self.npda.grammar();
        for &(winner, loser) in sim.reduce_conflicts() {
            let conflict = ReduceConflict {
                state: node,
                winner,
                loser,
            };
            if self.conflicts.insert(conflict) {
                tracing::warn!(
                    state = ?node,
                    "reduce/reduce conflict: `{}' is preferred over `{}'",
                    g.rule(winner).display(g),
                    g.rule(loser).display(g),
                );
            }
        }
    }

    fn emit(
        &mut self,
        node: NodeIndex,
        base: &Simulator<'n, 'g>,
        action: Action,
        seq: Vec<TerminalID>,
    ) {
        // the first token of a shift key is consumed, not looked ahead.
        let required = match action {
            Action::Shift => seq.len(),
            _ => seq.len() - 1,
        };
        self.lookahead = self.lookahead.max(required);
        let transition = match action {
            Action::Shift => {
                let t = seq[0];
                let mut next = base.clone();
                next.step(Step::Shift(t));
                let target = self.state(next.state());
                Transition::new(TransitionKind::Shift(SymbolID::T(t)), Some(target))
            }
            Action::Reduce(rule) => Transition::new(TransitionKind::Reduce(rule), None),
            Action::Return(n) => Transition::new(TransitionKind::Return(n), None),
            Action::ErrorPanic => Transition::new(TransitionKind::ErrorPanic, None),
        };
        self.graph.add_transition(node, transition.keyed(seq));
    }

    // Copy the error recovery transitions of the kernel and its closure.
    fn pass_through(&mut self, node: NodeIndex, kernel: &[NodeIndex], base: &Simulator<'n, 'g>) {
        let npda_graph = self.npda.graph();
        let mut sources = kernel.to_vec();
        for top in base.root_tops() {
            if !sources.contains(&top) {
                sources.push(top);
            }
        }

        let mut copied: Vec<(TransitionKind, Vec<TerminalID>)> = vec![];
        for source in sources {
            for transition in npda_graph.transitions(source) {
                if !matches!(
                    transition.kind,
                    TransitionKind::PopStack(..)
                        | TransitionKind::InsertLookaheadError
                        | TransitionKind::DiscardLookahead
                ) {
                    continue;
                }
                let key = (transition.kind, transition.lookahead.clone());
                if copied.contains(&key) {
                    continue;
                }
                self.graph.add_transition(
                    node,
                    Transition::new(transition.kind, None)
                        .keyed(transition.lookahead.clone())
                        .with_label("recovery"),
                );
                copied.push(key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        grammar::{Assoc, Grammar, Precedence, SymbolID::*},
        npda,
    };

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    #[test]
    fn one_state_per_kernel() {
        init_tracing();
        let grammar = Grammar::define(|g| {
            let a = g.terminal("a", None)?;
            let s = g.nonterminal("S")?;
            g.rule(s, [T(a), N(s)], None)?;
            g.rule(s, [T(a)], None)?;
            Ok(())
        })
        .unwrap();
        let config = Config::default();
        let npda = npda::build(&grammar, &config);
        let dpda = determinize(&npda, &config).unwrap();

        let mut kernels: Vec<_> = dpda
            .graph()
            .nodes()
            .map(|(_, node)| match &node.data {
                NodeData::DpdaState(kernel) => kernel.clone(),
                _ => panic!(),
            })
            .collect();
        let count = kernels.len();
        kernels.sort();
        kernels.dedup();
        assert_eq!(kernels.len(), count);

        for (_, node) in dpda.graph().nodes() {
            let defaults = node.transitions().iter().filter(|t| t.is_default()).count();
            assert_eq!(defaults, 1);
            assert!(node.transitions()[0].is_default());
        }
        assert_eq!(dpda.lookahead(), 1);
        assert!(dpda.conflicts().is_empty());
    }

    #[test]
    fn records_conflicts_settled_by_rule_order() {
        init_tracing();
        let mut rules = vec![];
        let grammar = Grammar::define(|g| {
            let c = g.terminal("c", None)?;
            let x = g.terminal("x", None)?;
            let y = g.terminal("y", None)?;
            let s = g.nonterminal("S")?;
            let a = g.nonterminal("A")?;
            let b = g.nonterminal("B")?;
            g.rule(s, [N(a), T(x)], None)?;
            g.rule(s, [N(b), T(y)], None)?;
            rules.push(g.rule(a, [T(c)], None)?);
            rules.push(g.rule(b, [T(c)], None)?);
            Ok(())
        })
        .unwrap();
        let config = Config::default();
        let npda = npda::build(&grammar, &config);
        let dpda = determinize(&npda, &config).unwrap();

        let conflicts = dpda.conflicts();
        assert_eq!(conflicts.len(), 1, "{:?}", conflicts);
        assert_eq!(conflicts[0].winner, rules[0]);
        assert_eq!(conflicts[0].loser, rules[1]);

        let first = dpda.graph().transitions(conflicts[0].state)[0].kind;
        assert_eq!(first, TransitionKind::Reduce(rules[0]));
    }

    #[test]
    fn precedence_breaks_reduce_conflicts_silently() {
        let mut rules = vec![];
        let grammar = Grammar::define(|g| {
            let c = g.terminal("c", None)?;
            let s = g.nonterminal("S")?;
            let a = g.nonterminal("A")?;
            let b = g.nonterminal("B")?;
            g.rule(s, [N(a)], None)?;
            g.rule(s, [N(b)], None)?;
            rules.push(g.rule(a, [T(c)], Some(Precedence::new(0, Assoc::Left)))?);
            rules.push(g.rule(b, [T(c)], Some(Precedence::new(1, Assoc::Left)))?);
            Ok(())
        })
        .unwrap();
        let config = Config::default();
        let npda = npda::build(&grammar, &config);
        let dpda = determinize(&npda, &config).unwrap();

        assert!(dpda.conflicts().is_empty());
        let reduces: Vec<_> = dpda
            .graph()
            .nodes()
            .flat_map(|(_, node)| node.transitions())
            .filter_map(|t| match t.kind {
                TransitionKind::Reduce(rule) => Some(rule),
                _ => None,
            })
            .collect();
        assert!(reduces.contains(&rules[1]));
        assert!(!reduces.contains(&rules[0]));
    }

    #[test]
    fn reports_unresolved_conflicts() {
        init_tracing();
        let grammar = Grammar::define(|g| {
            let a = g.terminal("a", None)?;
            let s = g.nonterminal("S")?;
            g.rule(s, [N(s), N(s)], None)?;
            g.rule(s, [T(a)], None)?;
            Ok(())
        })
        .unwrap();
        let config = Config::default();
        let npda = npda::build(&grammar, &config);
        let err = determinize(&npda, &config).unwrap_err();
        assert!(matches!(err, DpdaError::UnresolvedConflict { .. }));
    }
}
