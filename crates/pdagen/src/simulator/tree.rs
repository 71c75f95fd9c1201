//! The branch tree tracked while simulating the NPDA.

use crate::{
    grammar::{NonterminalID, RuleID},
    graph::NodeIndex,
    types::{Map, Set},
};
use std::fmt;

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct ActionId(u32);
impl fmt::Debug for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "A#{:03}", self.0)
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct BranchId(u32);
impl fmt::Debug for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B#{:03}", self.0)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum ActionKind {
    Root,
    Reduce(RuleID),
    Shift,
}

#[derive(Debug, Clone)]
pub(crate) struct ActionNode {
    pub(crate) kind: ActionKind,
    pub(crate) parent: Option<ActionId>,
    pub(crate) reduce: Option<ActionId>,
    pub(crate) shift: Option<ActionId>,
    /// The direct branches, in the same relative order as the parser ordering.
    pub(crate) branches: Vec<BranchId>,
    /// The rules that shifted the token into this node, with the number of
    /// live branches still observing each of them.
    pub(crate) range: Map<RuleID, usize>,
}

impl ActionNode {
    fn new(kind: ActionKind, parent: Option<ActionId>) -> Self {
        Self {
            kind,
            parent,
            reduce: None,
            shift: None,
            branches: vec![],
            range: Map::default(),
        }
    }

    fn is_empty(&self) -> bool {
        self.branches.is_empty() && self.reduce.is_none() && self.shift.is_none()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Branch {
    /// The NPDA states, one per rule frame. Never empty.
    pub(crate) stack: Vec<NodeIndex>,
    pub(crate) parent: ActionId,
    pub(crate) closed: bool,
    /// The nonterminal just derived, waiting to be shifted by the top frame.
    pub(crate) pending: Option<NonterminalID>,
    pub(crate) refs: Vec<(ActionId, RuleID)>,
    /// Callers already resumed since the last terminal shift.
    pub(crate) resumed: Set<NodeIndex>,
}

impl Branch {
    pub(crate) fn new(stack: Vec<NodeIndex>, parent: ActionId) -> Self {
        debug_assert!(!stack.is_empty());
        Self {
            stack,
            parent,
            closed: false,
            pending: None,
            refs: vec![],
            resumed: Set::default(),
        }
    }

    pub(crate) fn top(&self) -> NodeIndex {
        self.stack[self.stack.len() - 1]
    }

    pub(crate) fn set_top(&mut self, node: NodeIndex) {
        if let Some(top) = self.stack.last_mut() {
            *top = node;
        }
    }

    /// Create a branch inheriting everything but the stack.
    pub(crate) fn derive(&self, stack: Vec<NodeIndex>) -> Self {
        Self {
            stack,
            parent: self.parent,
            closed: false,
            pending: self.pending,
            refs: self.refs.clone(),
            resumed: self.resumed.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Tree {
    actions: Map<ActionId, ActionNode>,
    branches: Map<BranchId, Branch>,
    parser_order: Vec<BranchId>,
    root: ActionId,
    next_action: u32,
    next_branch: u32,
    dirty: Vec<ActionId>,
}

impl Tree {
    pub(crate) fn new() -> Self {
        let root = ActionId(0);
        let mut actions = Map::default();
        actions.insert(root, ActionNode::new(ActionKind::Root, None));
        Self {
            actions,
            branches: Map::default(),
            parser_order: vec![],
            root,
            next_action: 1,
            next_branch: 0,
            dirty: vec![],
        }
    }

    pub(crate) fn root(&self) -> ActionId {
        self.root
    }

    pub(crate) fn action(&self, id: ActionId) -> &ActionNode {
        &self.actions[&id]
    }

    pub(crate) fn contains_action(&self, id: ActionId) -> bool {
        self.actions.contains_key(&id)
    }

    pub(crate) fn branch(&self, id: BranchId) -> &Branch {
        &self.branches[&id]
    }

    pub(crate) fn branch_mut(&mut self, id: BranchId) -> &mut Branch {
        &mut self.branches[&id]
    }

    pub(crate) fn contains_branch(&self, id: BranchId) -> bool {
        self.branches.contains_key(&id)
    }

    /// A snapshot of the live branches in parser ordering.
    pub(crate) fn branch_ids(&self) -> Vec<BranchId> {
        self.parser_order.clone()
    }

    pub(crate) fn branches(&self) -> impl Iterator<Item = (BranchId, &Branch)> + '_ {
        self.parser_order
            .iter()
            .map(move |id| (*id, &self.branches[id]))
    }

    pub(crate) fn push_branch(&mut self, branch: Branch) -> BranchId {
        let id = self.alloc(branch);
        self.parser_order.push(id);
        self.attach(id);
        id
    }

    /// Replace `old` with `news`, placing them at its position in the parser ordering.
    pub(crate) fn replace_branch(&mut self, old: BranchId, news: Vec<Branch>) -> Vec<BranchId> {
        let pos = self.order_of(old);
        let ids: Vec<BranchId> = news.into_iter().map(|branch| self.alloc(branch)).collect();
        self.parser_order.splice(pos..pos, ids.iter().copied());
        for id in &ids {
            self.attach(*id);
        }
        self.remove_branch(old);
        ids
    }

    /// Move a branch under another action, keeping its place in the parser ordering.
    pub(crate) fn move_branch(&mut self, id: BranchId, to: ActionId) {
        let from = self.branches[&id].parent;
        self.actions[&from].branches.retain(|b| *b != id);
        self.branches[&id].parent = to;
        self.attach(id);
        self.detached(from);
    }

    pub(crate) fn remove_branch(&mut self, id: BranchId) {
        let Some(branch) = self.branches.swap_remove(&id) else {
            return;
        };
        self.parser_order.retain(|b| *b != id);
        self.actions[&branch.parent].branches.retain(|b| *b != id);
        self.release(&branch.refs);
        self.detached(branch.parent);
    }

    /// Find a live branch directly under `parent` equivalent to the given configuration.
    pub(crate) fn find_twin(
        &self,
        parent: ActionId,
        stack: &[NodeIndex],
        pending: Option<NonterminalID>,
        except: BranchId,
    ) -> Option<BranchId> {
        self.actions[&parent].branches.iter().copied().find(|id| {
            let branch = &self.branches[id];
            *id != except && branch.pending == pending && branch.stack == stack
        })
    }

    /// Let `twin` take over the observations held by `from`.
    pub(crate) fn merge_into(&mut self, twin: BranchId, from: BranchId) {
        let source = &self.branches[&from];
        let refs: Vec<_> = source
            .refs
            .iter()
            .copied()
            .filter(|r| !self.branches[&twin].refs.contains(r))
            .collect();
        let resumed = source.resumed.clone();
        for &(shift, rule) in &refs {
            if let Some(count) = self
                .actions
                .get_mut(&shift)
                .and_then(|action| action.range.get_mut(&rule))
            {
                *count += 1;
            }
        }
        let target = &mut self.branches[&twin];
        target.refs.extend(refs);
        target.resumed.extend(resumed);
    }

    /// Get the child of `parent` with the specified kind, creating it if missing.
    ///
    /// An existing reduce child is returned regardless of its rule.
    pub(crate) fn child(&mut self, parent: ActionId, kind: ActionKind) -> ActionId {
        let existing = match kind {
            ActionKind::Reduce(..) => self.actions[&parent].reduce,
            ActionKind::Shift => self.actions[&parent].shift,
            ActionKind::Root => unreachable!("the root cannot be a child"),
        };
        if let Some(id) = existing {
            return id;
        }

        let id = ActionId(self.next_action);
        self.next_action += 1;
        self.actions.insert(id, ActionNode::new(kind, Some(parent)));
        let node = &mut self.actions[&parent];
        match kind {
            ActionKind::Reduce(..) => node.reduce = Some(id),
            _ => node.shift = Some(id),
        }
        id
    }

    pub(crate) fn register_range(&mut self, shift: ActionId, rule: RuleID, branch: BranchId) {
        *self.actions[&shift].range.entry(rule).or_insert(0) += 1;
        self.branches[&branch].refs.push((shift, rule));
    }

    /// Remove the whole subtree rooted at the specified action.
    pub(crate) fn prune_action(&mut self, id: ActionId) {
        let doomed: Vec<BranchId> = self
            .parser_order
            .iter()
            .copied()
            .filter(|b| self.is_descendant(self.branches[b].parent, id))
            .collect();
        for branch in doomed {
            self.remove_branch(branch);
        }
        debug_assert!(!self.actions.contains_key(&id) || id == self.root);
    }

    pub(crate) fn take_dirty(&mut self) -> Option<ActionId> {
        self.dirty.pop()
    }

    pub(crate) fn has_trunk(&self) -> bool {
        let root = &self.actions[&self.root];
        root.branches.is_empty() && root.reduce.is_some() != root.shift.is_some()
    }

    pub(crate) fn remove_trunk(&mut self) {
        while self.has_trunk() {
            let Some(old) = self.actions.swap_remove(&self.root) else {
                break;
            };
            let Some(child) = old.reduce.or(old.shift) else {
                break;
            };
            let node = &mut self.actions[&child];
            node.parent = None;
            node.range.clear();
            self.root = child;
        }
    }

    fn alloc(&mut self, branch: Branch) -> BranchId {
        for &(shift, rule) in &branch.refs {
            if let Some(count) = self
                .actions
                .get_mut(&shift)
                .and_then(|action| action.range.get_mut(&rule))
            {
                *count += 1;
            }
        }
        let id = BranchId(self.next_branch);
        self.next_branch += 1;
        self.branches.insert(id, branch);
        id
    }

    fn attach(&mut self, id: BranchId) {
        let parent = self.branches[&id].parent;
        let pos = self.order_of(id);
        let list = &self.actions[&parent].branches;
        let at = list
            .iter()
            .position(|b| self.order_of(*b) > pos)
            .unwrap_or(list.len());
        self.actions[&parent].branches.insert(at, id);
    }

    fn order_of(&self, id: BranchId) -> usize {
        self.parser_order
            .iter()
            .position(|b| *b == id)
            .unwrap_or(self.parser_order.len())
    }

    fn release(&mut self, refs: &[(ActionId, RuleID)]) {
        for &(shift, rule) in refs {
            let Some(node) = self.actions.get_mut(&shift) else {
                continue;
            };
            let Some(count) = node.range.get_mut(&rule) else {
                continue;
            };
            *count -= 1;
            if *count == 0 {
                node.range.swap_remove(&rule);
                if let Some(parent) = node.parent {
                    self.dirty.push(parent);
                }
            }
        }
    }

    // Called after a branch or a child left the action.
    fn detached(&mut self, id: ActionId) {
        let Some(node) = self.actions.get(&id) else {
            return;
        };
        if !node.branches.is_empty() {
            return;
        }
        if node.is_empty() && id != self.root {
            self.remove_action(id);
        } else {
            self.dirty.push(id);
        }
    }

    fn remove_action(&mut self, id: ActionId) {
        let Some(node) = self.actions.swap_remove(&id) else {
            return;
        };
        debug_assert!(node.is_empty());
        if let Some(parent) = node.parent {
            let p = &mut self.actions[&parent];
            if p.reduce == Some(id) {
                p.reduce = None;
            }
            if p.shift == Some(id) {
                p.shift = None;
            }
            self.detached(parent);
        }
    }

    fn is_descendant(&self, mut id: ActionId, ancestor: ActionId) -> bool {
        loop {
            if id == ancestor {
                return true;
            }
            match self.actions.get(&id).and_then(|node| node.parent) {
                Some(parent) => id = parent,
                None => return false,
            }
        }
    }
}
