//! Simulation of the NPDA over a lookahead sequence.
//!
//! The simulator keeps every parse configuration reachable from a set of NPDA
//! states as a *branch*, grouped under a tree of the actions (reduce or shift)
//! taken since the start. Conflicts between sibling actions are resolved as
//! soon as the branches that could still affect them are gone.

mod resolve;
mod tree;

use self::{
    resolve::Resolution,
    tree::{ActionKind, Branch, BranchId, Tree},
};
use crate::{
    grammar::{NonterminalID, RuleID, SymbolID, TerminalID, TerminalSet},
    graph::{Graph, NodeData, NodeIndex, TransitionKind},
    npda::{rule_stage, Npda},
    types::Set,
};
use std::cmp::Ordering;

/// The action determined by a simulation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    Shift,
    Reduce(RuleID),
    Return(NonterminalID),
    ErrorPanic,
}

/// An action chosen from outside the simulation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Step {
    Shift(TerminalID),
    Reduce(RuleID),
}

enum Decision {
    Reduce(RuleID),
    Wait,
    NoReduce,
}

#[derive(Debug, Clone)]
pub struct Simulator<'n, 'g> {
    npda: &'n Npda<'g>,
    tree: Tree,
    /// Reduce/reduce conflicts settled by rule order, as (winner, loser).
    conflicts: Vec<(RuleID, RuleID)>,
}

impl<'n, 'g> Simulator<'n, 'g> {
    pub fn new(npda: &'n Npda<'g>, start: NodeIndex) -> Self {
        Self::with_states(npda, [start])
    }

    /// Start a simulation with one branch for each of the specified states.
    pub fn with_states<I>(npda: &'n Npda<'g>, states: I) -> Self
    where
        I: IntoIterator<Item = NodeIndex>,
    {
        let mut tree = Tree::new();
        let root = tree.root();
        for state in states {
            tree.push_branch(Branch::new(vec![state], root));
        }
        let mut sim = Self {
            npda,
            tree,
            conflicts: vec![],
        };
        sim.close_all();
        sim
    }

    fn graph(&self) -> &'n Graph {
        let npda = self.npda;
        npda.graph()
    }

    /// Feed the lookahead tokens until the action of the root is determined,
    /// the tokens run out or every branch fails to shift.
    pub fn run(&mut self, lookahead: &[TerminalID]) {
        let mut input = lookahead.iter().copied();
        let mut la = input.next();

        // bound on the rounds without consuming a token, reached only with
        // cyclic derivations.
        let limit = self.graph().len() * 2 + 16;
        let mut rounds = 0;

        loop {
            self.close_all();
            self.resolve_conflicts();
            if self.tree.has_trunk() {
                break;
            }

            if self.advance_pending() || self.reduce_all(la) {
                rounds += 1;
                if rounds > limit {
                    tracing::warn!("stop the simulation of a cyclic derivation");
                    break;
                }
                continue;
            }

            let Some(t) = la else {
                break;
            };
            if !self.shift(t) {
                break;
            }
            rounds = 0;
            la = input.next();
        }

        self.resolve_conflicts();
    }

    /// Apply an externally chosen action to the branches at the root.
    pub fn step(&mut self, step: Step) {
        let root = self.tree.root();
        match step {
            Step::Shift(t) => {
                self.prune_children();
                for id in self.tree.action(root).branches.clone() {
                    let branch = self.tree.branch(id);
                    let target = match branch.pending {
                        None => self.shift_target(branch.top(), SymbolID::T(t)),
                        Some(..) => None,
                    };
                    match target {
                        Some(target) => self.restart(id, target),
                        None => self.tree.remove_branch(id),
                    }
                }
            }

            Step::Reduce(rule) => {
                if let Some(shift) = self.tree.action(root).shift {
                    self.tree.prune_action(shift);
                }
                let current = self
                    .tree
                    .action(root)
                    .reduce
                    .map(|reduce| self.tree.action(reduce).kind);
                let already = current == Some(ActionKind::Reduce(rule));
                if !already {
                    if let Some(reduce) = self.tree.action(root).reduce {
                        self.tree.prune_action(reduce);
                    }
                }
                for id in self.tree.action(root).branches.clone() {
                    let branch = self.tree.branch(id);
                    let reducible = !already
                        && branch.pending.is_none()
                        && self
                            .graph()
                            .transitions(branch.top())
                            .iter()
                            .any(|t| t.kind == TransitionKind::Reduce(rule));
                    if reducible {
                        self.reduce(id, rule);
                    } else {
                        self.tree.remove_branch(id);
                    }
                }
            }
        }

        self.close_all();
        self.resolve_conflicts();
        self.remove_trunk();
    }

    /// Force every branch at the root to shift the nonterminal `n`.
    pub fn shift_nonterminal(&mut self, n: NonterminalID) {
        self.prune_children();
        let root = self.tree.root();
        for id in self.tree.action(root).branches.clone() {
            let branch = self.tree.branch(id);
            let target = match branch.pending {
                None => self.shift_target(branch.top(), SymbolID::N(n)),
                Some(..) => None,
            };
            match target {
                Some(target) => self.restart(id, target),
                None => self.tree.remove_branch(id),
            }
        }
        self.close_all();
        self.remove_trunk();
    }

    /// Collapse the chain of actions that every branch has taken.
    pub fn remove_trunk(&mut self) {
        self.tree.remove_trunk();
    }

    pub fn has_trunk(&self) -> bool {
        self.tree.has_trunk()
    }

    pub fn first_trunk_action(&self) -> Option<Action> {
        if !self.tree.has_trunk() {
            return None;
        }
        let root = self.tree.action(self.tree.root());
        match (root.reduce, root.shift) {
            (Some(reduce), None) => match self.tree.action(reduce).kind {
                ActionKind::Reduce(rule) => Some(Action::Reduce(rule)),
                _ => None,
            },
            (None, Some(..)) => Some(Action::Shift),
            _ => None,
        }
    }

    /// The action taken when no lookahead selects another one.
    pub fn default_action(&self) -> Action {
        let root = self.tree.action(self.tree.root());
        if let Some(reduce) = root.reduce {
            if let ActionKind::Reduce(rule) = self.tree.action(reduce).kind {
                return Action::Reduce(rule);
            }
        }

        // branches still waiting for a lookahead reduce when it matches none
        // of their keys.
        let fallback = root
            .branches
            .iter()
            .map(|id| self.tree.branch(*id))
            .filter(|branch| branch.pending.is_none())
            .filter_map(|branch| self.fallback_reduce(branch.top()))
            .reduce(|a, b| if self.prefers(b, a) { b } else { a });
        if let Some(rule) = fallback {
            return Action::Reduce(rule);
        }

        root.branches
            .iter()
            .find_map(|id| self.returns(self.tree.branch(*id).top()))
            .map_or(Action::ErrorPanic, Action::Return)
    }

    /// The action determined so far, if any.
    pub fn outcome(&self) -> Option<Action> {
        if let Some(action) = self.first_trunk_action() {
            return Some(action);
        }

        let root = self.tree.action(self.tree.root());
        if root.reduce.is_some() || root.shift.is_some() {
            return None;
        }
        if root.branches.is_empty() {
            return Some(Action::ErrorPanic);
        }
        let mut returned = None;
        for id in &root.branches {
            let n = self.returns(self.tree.branch(*id).top())?;
            returned.get_or_insert(n);
        }
        returned.map(Action::Return)
    }

    /// The NPDA states at the bottom of the live branches, in parser ordering.
    pub fn state(&self) -> Vec<NodeIndex> {
        let mut state = Set::default();
        for (_, branch) in self.tree.branches() {
            state.insert(branch.stack[0]);
        }
        state.into_iter().collect()
    }

    /// The terminals that may affect the outcome of the next step.
    pub fn lookahead_candidates(&self) -> TerminalSet {
        let mut candidates = TerminalSet::default();
        for (_, branch) in self.tree.branches() {
            if branch.pending.is_some() {
                continue;
            }
            for transition in self.graph().transitions(branch.top()) {
                match transition.kind {
                    TransitionKind::Shift(SymbolID::T(t)) => {
                        candidates.insert(t);
                    }
                    TransitionKind::Reduce(..)
                    | TransitionKind::ErrorPanic
                    | TransitionKind::DiscardLookahead => {
                        if let Some(t) = transition.lookahead.first() {
                            candidates.insert(*t);
                        }
                    }
                    TransitionKind::Return(..) => {
                        candidates.insert(TerminalID::END);
                    }
                    _ => (),
                }
            }
        }
        candidates
    }

    /// The nonterminals that a branch at the root is able to shift.
    pub fn shiftable_nonterminals(&self) -> Vec<NonterminalID> {
        let mut nonterminals = Set::default();
        let root = self.tree.action(self.tree.root());
        for id in &root.branches {
            let branch = self.tree.branch(*id);
            if branch.pending.is_some() {
                continue;
            }
            for transition in self.graph().transitions(branch.top()) {
                if let TransitionKind::Shift(SymbolID::N(n)) = transition.kind {
                    nonterminals.insert(n);
                }
            }
        }
        nonterminals.into_iter().collect()
    }

    /// The reduce/reduce conflicts that precedence could not break, as pairs
    /// of the winning and the losing rule.
    pub fn reduce_conflicts(&self) -> &[(RuleID, RuleID)] {
        &self.conflicts
    }

    pub(crate) fn root_tops(&self) -> Vec<NodeIndex> {
        let root = self.tree.action(self.tree.root());
        root.branches
            .iter()
            .map(|id| self.tree.branch(*id).top())
            .collect()
    }

    fn close_all(&mut self) {
        for id in self.tree.branch_ids() {
            if self.tree.contains_branch(id) && !self.tree.branch(id).closed {
                self.close(id);
            }
        }
    }

    fn close(&mut self, id: BranchId) {
        let branch = self.tree.branch(id);
        let mut visited = Set::default();
        let mut stacks = vec![];
        close_stack(self.graph(), branch.stack.clone(), &mut visited, &mut stacks);

        if let [stack] = &stacks[..] {
            if *stack == branch.stack {
                self.tree.branch_mut(id).closed = true;
                return;
            }
        }

        let (parent, pending) = (branch.parent, branch.pending);
        let mut news = vec![];
        for stack in stacks {
            if let Some(twin) = self.tree.find_twin(parent, &stack, pending, id) {
                self.tree.merge_into(twin, id);
                continue;
            }
            let mut derived = self.tree.branch(id).derive(stack);
            derived.closed = true;
            news.push(derived);
        }
        self.tree.replace_branch(id, news);
    }

    fn advance_pending(&mut self) -> bool {
        let mut advanced = false;
        for id in self.tree.branch_ids() {
            if !self.tree.contains_branch(id) {
                continue;
            }
            let branch = self.tree.branch(id);
            let Some(n) = branch.pending else {
                continue;
            };
            advanced = true;
            match self.shift_target(branch.top(), SymbolID::N(n)) {
                Some(target) => {
                    let branch = self.tree.branch_mut(id);
                    branch.set_top(target);
                    branch.pending = None;
                    branch.closed = false;
                }
                None => self.tree.remove_branch(id),
            }
        }
        advanced
    }

    fn reduce_all(&mut self, la: Option<TerminalID>) -> bool {
        let mut reduced = false;
        for id in self.tree.branch_ids() {
            if !self.tree.contains_branch(id) {
                continue;
            }
            let branch = self.tree.branch(id);
            if branch.pending.is_some() {
                continue;
            }
            if let Decision::Reduce(rule) = self.decision(branch.top(), la) {
                self.reduce(id, rule);
                reduced = true;
            }
        }
        reduced
    }

    fn decision(&self, node: NodeIndex, la: Option<TerminalID>) -> Decision {
        for transition in self.graph().transitions(node) {
            match transition.kind {
                TransitionKind::Reduce(..)
                | TransitionKind::ErrorPanic
                | TransitionKind::DiscardLookahead => (),
                _ => continue,
            }
            if let Some(key) = transition.lookahead.first() {
                match la {
                    None => return Decision::Wait,
                    Some(la) if la != *key => continue,
                    Some(..) => (),
                }
            }
            return match transition.kind {
                TransitionKind::Reduce(rule) => Decision::Reduce(rule),
                _ => Decision::NoReduce,
            };
        }
        Decision::NoReduce
    }

    // The reduction taken with a lookahead that matches no key.
    fn fallback_reduce(&self, node: NodeIndex) -> Option<RuleID> {
        let transition = self.graph().transitions(node).iter().find(|t| {
            t.lookahead.is_empty()
                && matches!(
                    t.kind,
                    TransitionKind::Reduce(..)
                        | TransitionKind::ErrorPanic
                        | TransitionKind::DiscardLookahead
                )
        })?;
        match transition.kind {
            TransitionKind::Reduce(rule) => Some(rule),
            _ => None,
        }
    }

    fn reduce(&mut self, id: BranchId, rule: RuleID) {
        let grammar = self.npda.grammar();
        let owner = grammar.rule(rule).left();
        let branch = self.tree.branch(id);
        let parent = branch.parent;

        let mut stack = branch.stack.clone();
        stack.pop();
        let mut resumed = branch.resumed.clone();
        let stacks: Vec<Vec<NodeIndex>> = if stack.is_empty() {
            let callers: Vec<NodeIndex> = self
                .npda
                .callers(owner)
                .iter()
                .copied()
                .filter(|caller| !resumed.contains(caller))
                .collect();
            resumed.extend(callers.iter().copied());
            callers.into_iter().map(|caller| vec![caller]).collect()
        } else {
            vec![stack]
        };

        if stacks.is_empty() {
            self.tree.remove_branch(id);
            return;
        }

        let existing = self
            .tree
            .action(parent)
            .reduce
            .map(|reduce| (reduce, self.tree.action(reduce).kind));
        let target = match existing {
            Some((existing, kind)) => match kind {
                ActionKind::Reduce(current) if current == rule => existing,
                ActionKind::Reduce(current) if !self.prefers(rule, current) => {
                    self.note_conflict(current, rule);
                    self.tree.remove_branch(id);
                    return;
                }
                current => {
                    if let ActionKind::Reduce(current) = current {
                        self.note_conflict(rule, current);
                    }
                    self.tree.prune_action(existing);
                    self.tree.child(parent, ActionKind::Reduce(rule))
                }
            },
            None => self.tree.child(parent, ActionKind::Reduce(rule)),
        };

        let base = self.tree.branch(id);
        let news = stacks
            .into_iter()
            .map(|stack| {
                let mut branch = base.derive(stack);
                branch.parent = target;
                branch.pending = Some(owner);
                branch.resumed = resumed.clone();
                branch
            })
            .collect();
        self.tree.replace_branch(id, news);
    }

    fn priority(&self, rule: RuleID) -> Option<u16> {
        let g = self.npda.grammar();
        g.rule(rule).precedence(g).map(|p| p.priority)
    }

    // Whether the rule `a` wins a reduce/reduce conflict against `b`.
    fn prefers(&self, a: RuleID, b: RuleID) -> bool {
        match self.priority(a).cmp(&self.priority(b)) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => a.index() < b.index(),
        }
    }

    fn note_conflict(&mut self, winner: RuleID, loser: RuleID) {
        tracing::trace!(?winner, ?loser, "reduce/reduce conflict");
        if self.priority(winner) == self.priority(loser)
            && !self.conflicts.contains(&(winner, loser))
        {
            self.conflicts.push((winner, loser));
        }
    }

    /// Shift `t` on every live branch, returning whether any branch survived.
    fn shift(&mut self, t: TerminalID) -> bool {
        let graph = self.graph();
        let mut shifted = false;
        let mut doomed = vec![];

        for id in self.tree.branch_ids() {
            if !self.tree.contains_branch(id) {
                continue;
            }
            let branch = self.tree.branch(id);
            let top = branch.top();
            let Some(target) = self.shift_target(top, SymbolID::T(t)) else {
                doomed.push((id, self.returns(top).is_some()));
                continue;
            };

            let parent = branch.parent;
            let observed = self.tree.action(parent).reduce.is_some();
            let shift = self.tree.child(parent, ActionKind::Shift);
            self.tree.move_branch(id, shift);
            if observed {
                if let Some((rule, _)) = rule_stage(graph, top) {
                    self.tree.register_range(shift, rule, id);
                }
            }

            let branch = self.tree.branch_mut(id);
            branch.set_top(target);
            branch.closed = false;
            branch.resumed.clear();
            shifted = true;
        }

        for (id, returns) in doomed {
            if shifted || !returns {
                self.tree.remove_branch(id);
            }
        }

        shifted
    }

    fn resolve_conflicts(&mut self) {
        let g = self.npda.grammar();
        while let Some(id) = self.tree.take_dirty() {
            if !self.tree.contains_action(id) {
                continue;
            }
            let action = self.tree.action(id);
            if !action.branches.is_empty() {
                continue;
            }
            let (Some(reduce), Some(shift)) = (action.reduce, action.shift) else {
                continue;
            };
            let ActionKind::Reduce(rule) = self.tree.action(reduce).kind else {
                continue;
            };
            let range: Vec<_> = self
                .tree
                .action(shift)
                .range
                .keys()
                .map(|r| g.rule(*r).precedence(g))
                .collect();
            if range.is_empty() {
                continue;
            }

            let resolution = resolve::resolve(g.rule(rule).precedence(g), &range);
            tracing::trace!(?rule, ?resolution, "shift/reduce conflict");
            match resolution {
                Resolution::Shift => self.tree.prune_action(reduce),
                Resolution::Reduce => self.tree.prune_action(shift),
                Resolution::Error => {
                    self.tree.prune_action(shift);
                    self.tree.prune_action(reduce);
                }
                Resolution::Unresolved => (),
            }
        }
    }

    fn prune_children(&mut self) {
        let root = self.tree.action(self.tree.root());
        let children = [root.reduce, root.shift];
        for child in children.into_iter().flatten() {
            self.tree.prune_action(child);
        }
    }

    // Move the branch to `target`, dropping the frames below it.
    fn restart(&mut self, id: BranchId, target: NodeIndex) {
        let branch = self.tree.branch_mut(id);
        branch.stack = vec![target];
        branch.closed = false;
        branch.resumed.clear();
    }

    fn shift_target(&self, node: NodeIndex, symbol: SymbolID) -> Option<NodeIndex> {
        self.graph()
            .transitions(node)
            .iter()
            .find(|t| t.kind == TransitionKind::Shift(symbol))
            .and_then(|t| t.target)
    }

    fn returns(&self, node: NodeIndex) -> Option<NonterminalID> {
        self.graph()
            .transitions(node)
            .iter()
            .find_map(|t| match t.kind {
                TransitionKind::Return(n) => Some(n),
                _ => None,
            })
    }
}

fn close_stack(
    graph: &Graph,
    stack: Vec<NodeIndex>,
    visited: &mut Set<NodeIndex>,
    closed: &mut Vec<Vec<NodeIndex>>,
) {
    let top = stack[stack.len() - 1];
    if !visited.insert(top) {
        return;
    }

    let transitions = graph.transitions(top);
    if transitions
        .iter()
        .any(|t| t.kind != TransitionKind::Epsilon)
    {
        closed.push(stack.clone());
    }

    for transition in transitions {
        let (TransitionKind::Epsilon, Some(target)) = (transition.kind, transition.target) else {
            continue;
        };
        let mut next = stack.clone();
        match graph.data(target) {
            NodeData::Head(..) => next.push(target),
            _ => {
                if let Some(top) = next.last_mut() {
                    *top = target;
                }
            }
        }
        close_stack(graph, next, visited, closed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Config,
        grammar::{Assoc, Grammar, Precedence, SymbolID::*},
        npda,
    };

    fn nonterminal(g: &Grammar, name: &str) -> NonterminalID {
        match g.symbol(name) {
            Some(N(n)) => n,
            _ => panic!("unknown nonterminal: {}", name),
        }
    }

    fn terminal(g: &Grammar, name: &str) -> TerminalID {
        match g.symbol(name) {
            Some(T(t)) => t,
            _ => panic!("unknown terminal: {}", name),
        }
    }

    fn stage(npda: &Npda<'_>, rule: RuleID, stage: u16) -> NodeIndex {
        npda.graph()
            .nodes()
            .map(|(index, _)| index)
            .find(|index| rule_stage(npda.graph(), *index) == Some((rule, stage)))
            .unwrap()
    }

    #[test]
    fn closure_enters_rules_of_nonterminals() {
        let grammar = Grammar::define(|g| {
            let a = g.terminal("a", None)?;
            let b = g.terminal("b", None)?;
            let s = g.nonterminal("S")?;
            g.rule(s, [T(a), N(s), T(b)], None)?;
            g.rule(s, [T(a), T(b)], None)?;
            Ok(())
        })
        .unwrap();
        let npda = npda::build(&grammar, &Config::default());
        let s = nonterminal(&grammar, "S");
        let start = npda.nodes_of(s).unwrap().start;

        let sim = Simulator::new(&npda, start);
        assert_eq!(sim.state(), [start]);
        assert_eq!(sim.outcome(), None);
        assert_eq!(sim.default_action(), Action::ErrorPanic);
        assert_eq!(
            sim.lookahead_candidates().iter().collect::<Vec<_>>(),
            [terminal(&grammar, "a")]
        );
        assert_eq!(sim.shiftable_nonterminals(), [s]);

        let mut fork = sim.clone();
        fork.run(&[terminal(&grammar, "a")]);
        assert_eq!(fork.outcome(), Some(Action::Shift));

        let mut next = sim.clone();
        next.step(Step::Shift(terminal(&grammar, "a")));
        let mut state = next.state();
        state.sort();
        let rules: Vec<_> = grammar.rules.keys().copied().collect();
        assert_eq!(state, [stage(&npda, rules[0], 1), stage(&npda, rules[1], 1)]);

        let mut accepted = sim.clone();
        accepted.shift_nonterminal(s);
        assert_eq!(accepted.state(), [npda.nodes_of(s).unwrap().ret]);
        assert_eq!(accepted.default_action(), Action::Return(s));
    }

    #[test]
    fn reduce_reduce_prefers_earlier_rule() {
        let mut rules = vec![];
        let grammar = Grammar::define(|g| {
            let x = g.terminal("x", None)?;
            let y = g.terminal("y", None)?;
            let s = g.nonterminal("S")?;
            let a = g.nonterminal("A")?;
            let b = g.nonterminal("B")?;
            g.rule(s, [N(b), T(y)], None)?;
            g.rule(s, [N(a), T(y)], None)?;
            rules.push(g.rule(a, [T(x)], None)?);
            rules.push(g.rule(b, [T(x)], None)?);
            Ok(())
        })
        .unwrap();
        let npda = npda::build(&grammar, &Config::default());

        let mut sim = Simulator::with_states(
            &npda,
            [stage(&npda, rules[1], 1), stage(&npda, rules[0], 1)],
        );
        sim.run(&[]);
        assert_eq!(sim.default_action(), Action::Reduce(rules[0]));
        assert_eq!(sim.outcome(), Some(Action::Reduce(rules[0])));
        assert_eq!(sim.reduce_conflicts(), [(rules[0], rules[1])]);
    }

    #[test]
    fn reduce_reduce_prefers_higher_precedence() {
        let mut rules = vec![];
        let grammar = Grammar::define(|g| {
            let x = g.terminal("x", None)?;
            let s = g.nonterminal("S")?;
            let a = g.nonterminal("A")?;
            let b = g.nonterminal("B")?;
            g.rule(s, [N(a)], None)?;
            g.rule(s, [N(b)], None)?;
            rules.push(g.rule(a, [T(x)], Some(Precedence::new(0, Assoc::Left)))?);
            rules.push(g.rule(b, [T(x)], Some(Precedence::new(1, Assoc::Left)))?);
            Ok(())
        })
        .unwrap();
        let npda = npda::build(&grammar, &Config::default());

        let mut sim = Simulator::with_states(
            &npda,
            [stage(&npda, rules[0], 1), stage(&npda, rules[1], 1)],
        );
        sim.run(&[]);
        assert_eq!(sim.default_action(), Action::Reduce(rules[1]));
        assert_eq!(sim.outcome(), Some(Action::Reduce(rules[1])));
        assert!(sim.reduce_conflicts().is_empty());
    }

    #[test]
    fn step_applies_the_chosen_reduction() {
        let mut rules = vec![];
        let grammar = Grammar::define(|g| {
            let x = g.terminal("x", None)?;
            let y = g.terminal("y", None)?;
            let s = g.nonterminal("S")?;
            let a = g.nonterminal("A")?;
            let b = g.nonterminal("B")?;
            rules.push(g.rule(s, [N(b), T(y)], None)?);
            g.rule(s, [N(a), T(y)], None)?;
            rules.push(g.rule(a, [T(x)], None)?);
            rules.push(g.rule(b, [T(x)], None)?);
            Ok(())
        })
        .unwrap();
        let npda = npda::build(&grammar, &Config::default());
        let y = terminal(&grammar, "y");

        let sim = Simulator::with_states(
            &npda,
            [stage(&npda, rules[2], 1), stage(&npda, rules[1], 1)],
        );

        let mut preferred = sim.clone();
        preferred.run(&[]);
        assert_eq!(preferred.default_action(), Action::Reduce(rules[1]));

        let mut chosen = sim.clone();
        chosen.step(Step::Reduce(rules[2]));
        assert!(!chosen.has_trunk());
        assert_eq!(chosen.state(), [stage(&npda, rules[0], 0)]);
        assert_eq!(chosen.default_action(), Action::ErrorPanic);

        chosen.run(&[y]);
        assert_eq!(chosen.outcome(), Some(Action::Shift));
    }

    #[test]
    fn step_reduces_into_the_callers() {
        let mut rules = vec![];
        let grammar = Grammar::define(|g| {
            let a = g.terminal("a", None)?;
            let b = g.terminal("b", None)?;
            let s = g.nonterminal("S")?;
            rules.push(g.rule(s, [T(a), N(s), T(b)], None)?);
            rules.push(g.rule(s, [T(a), T(b)], None)?);
            Ok(())
        })
        .unwrap();
        let npda = npda::build(&grammar, &Config::default());
        let s = nonterminal(&grammar, "S");
        let nodes = *npda.nodes_of(s).unwrap();

        let mut sim = Simulator::new(&npda, nodes.start);
        sim.step(Step::Shift(terminal(&grammar, "a")));
        sim.step(Step::Shift(terminal(&grammar, "b")));
        assert_eq!(sim.state(), [stage(&npda, rules[1], 2)]);

        sim.step(Step::Reduce(rules[1]));
        let mut state = sim.state();
        state.sort();
        assert_eq!(state, [nodes.start, stage(&npda, rules[0], 1)]);

        sim.run(&[TerminalID::END]);
        assert_eq!(sim.outcome(), Some(Action::Return(s)));
        assert_eq!(sim.default_action(), Action::Return(s));
    }

    #[test]
    fn inverted_lookahead_reduces_otherwise() {
        let mut rules = vec![];
        let grammar = Grammar::define(|g| {
            let ident = g.terminal("ID", None)?;
            let lparen = g.terminal("LPAREN", None)?;
            let rparen = g.terminal("RPAREN", None)?;
            let s = g.nonterminal("S")?;
            let name = g.rule(s, [T(ident)], None)?;
            g.lookahead(name, true, [lparen])?;
            rules.push(name);
            rules.push(g.rule(s, [T(ident), T(lparen), T(rparen)], None)?);
            Ok(())
        })
        .unwrap();
        let npda = npda::build(&grammar, &Config::default());
        let lparen = terminal(&grammar, "LPAREN");

        let mut base = Simulator::with_states(
            &npda,
            [stage(&npda, rules[0], 1), stage(&npda, rules[1], 1)],
        );
        base.run(&[]);
        assert_eq!(base.outcome(), None);
        assert_eq!(base.default_action(), Action::Reduce(rules[0]));
        assert_eq!(
            base.lookahead_candidates().iter().collect::<Vec<_>>(),
            [lparen]
        );

        let mut fork = base.clone();
        fork.run(&[lparen]);
        assert_eq!(fork.outcome(), Some(Action::Shift));
    }

    fn arithmetic(assoc: Assoc) -> Grammar {
        Grammar::define(|g| {
            let plus = g.terminal("PLUS", Some(Precedence::new(0, assoc)))?;
            let star = g.terminal("STAR", Some(Precedence::new(1, Assoc::Left)))?;
            let num = g.terminal("NUM", None)?;
            let e = g.nonterminal("E")?;
            g.rule(e, [N(e), T(plus), N(e)], None)?;
            g.rule(e, [N(e), T(star), N(e)], None)?;
            g.rule(e, [T(num)], None)?;
            Ok(())
        })
        .unwrap()
    }

    fn after_addition<'n, 'g>(npda: &'n Npda<'g>) -> Simulator<'n, 'g> {
        let rules: Vec<_> = npda.grammar().rules.keys().copied().collect();
        let mut sim = Simulator::with_states(
            npda,
            [
                stage(npda, rules[0], 3),
                stage(npda, rules[0], 1),
                stage(npda, rules[1], 1),
            ],
        );
        sim.run(&[]);
        sim
    }

    #[test]
    fn precedence_resolves_shift_reduce() {
        let grammar = arithmetic(Assoc::Left);
        let npda = npda::build(&grammar, &Config::default());
        let addition = grammar.rules.keys().copied().next().unwrap();
        let (plus, star) = (terminal(&grammar, "PLUS"), terminal(&grammar, "STAR"));

        let base = after_addition(&npda);
        assert_eq!(base.default_action(), Action::Reduce(addition));

        let mut fork = base.clone();
        fork.run(&[star]);
        assert_eq!(fork.outcome(), Some(Action::Shift));

        let mut fork = base.clone();
        fork.run(&[plus]);
        assert_eq!(fork.outcome(), Some(Action::Reduce(addition)));

        let mut fork = base.clone();
        fork.run(&[TerminalID::END]);
        assert_eq!(fork.outcome(), Some(Action::Reduce(addition)));
    }

    #[test]
    fn right_associativity_prefers_shift() {
        let grammar = arithmetic(Assoc::Right);
        let npda = npda::build(&grammar, &Config::default());

        let mut fork = after_addition(&npda);
        fork.run(&[terminal(&grammar, "PLUS")]);
        assert_eq!(fork.outcome(), Some(Action::Shift));
    }

    #[test]
    fn nonassoc_rejects_the_lookahead() {
        let grammar = arithmetic(Assoc::Nonassoc);
        let npda = npda::build(&grammar, &Config::default());

        let mut fork = after_addition(&npda);
        fork.run(&[terminal(&grammar, "PLUS")]);
        assert_eq!(fork.outcome(), Some(Action::ErrorPanic));
    }

    #[test]
    fn unresolved_conflict_needs_more_lookahead() {
        let mut rules = vec![];
        let grammar = Grammar::define(|g| {
            let a = g.terminal("a", None)?;
            let x = g.terminal("x", None)?;
            let y = g.terminal("y", None)?;
            let z = g.terminal("z", None)?;
            let s = g.nonterminal("S")?;
            let n = g.nonterminal("A")?;
            g.rule(s, [N(n), T(x), T(y)], None)?;
            rules.push(g.rule(s, [T(a), T(x), T(z)], None)?);
            rules.push(g.rule(n, [T(a)], None)?);
            Ok(())
        })
        .unwrap();
        let npda = npda::build(&grammar, &Config::default());
        let (x, y, z) = (
            terminal(&grammar, "x"),
            terminal(&grammar, "y"),
            terminal(&grammar, "z"),
        );

        let mut base = Simulator::with_states(
            &npda,
            [stage(&npda, rules[0], 1), stage(&npda, rules[1], 1)],
        );
        base.run(&[]);
        assert_eq!(base.default_action(), Action::Reduce(rules[1]));

        let mut fork = base.clone();
        fork.run(&[x]);
        assert_eq!(fork.outcome(), None);

        let mut shifted = fork.clone();
        shifted.run(&[z]);
        assert_eq!(shifted.outcome(), Some(Action::Shift));

        let mut reduced = fork.clone();
        reduced.run(&[y]);
        assert_eq!(reduced.outcome(), Some(Action::Reduce(rules[1])));
    }
}
