//! A reference parser walking the transitions of a DPDA.

use anyhow::{bail, Context as _};
use pdagen::{
    dpda::Dpda,
    grammar::{Grammar, NonterminalID, RuleID, SymbolID, TerminalID},
    graph::{Transition, TransitionKind},
};

/// Parse `input` as the nonterminal `start` and return the reduced rules in
/// the order they were applied.
pub fn parse(
    grammar: &Grammar,
    dpda: &Dpda,
    start: NonterminalID,
    input: &[TerminalID],
) -> anyhow::Result<Vec<RuleID>> {
    let graph = dpda.graph();
    let mut stack = vec![dpda
        .start(start)
        .context("the nonterminal has no start state")?];
    let mut pos = 0;
    let mut reduced = vec![];

    loop {
        let top = stack[stack.len() - 1];
        let transition = select(graph.transitions(top), &input[pos..])
            .with_context(|| format!("no transition from {:?} at {}", top, pos))?;

        match transition.kind {
            TransitionKind::Shift(SymbolID::T(t)) => {
                if input.get(pos) != Some(&t) {
                    bail!("shifted {:?} at {} which is not in the input", t, pos);
                }
                let target = transition.target.context("shift without target")?;
                stack.push(target);
                pos += 1;
            }

            TransitionKind::Reduce(rule) => {
                let rule = grammar.rule(rule);
                let len = rule.right().len();
                if len >= stack.len() {
                    bail!("stack underflow while reducing {}", rule.display(grammar));
                }
                stack.truncate(stack.len() - len);

                let top = stack[stack.len() - 1];
                let goto = TransitionKind::Shift(SymbolID::N(rule.left()));
                let target = graph
                    .transitions(top)
                    .iter()
                    .find(|t| t.kind == goto)
                    .and_then(|t| t.target)
                    .with_context(|| format!("no goto from {:?} after reduction", top))?;
                stack.push(target);
                reduced.push(rule.id());
            }

            TransitionKind::Return(n) => {
                if n != start || pos < input.len() {
                    bail!("unexpected return at {}", pos);
                }
                return Ok(reduced);
            }

            TransitionKind::ErrorPanic => bail!("syntax error at {}", pos),

            kind => bail!("unexpected transition: {:?}", kind),
        }
    }
}

// Prefer a keyed transition whose lookahead matches the input padded with
// the end marker, otherwise take the default one.
fn select<'a>(transitions: &'a [Transition], input: &[TerminalID]) -> Option<&'a Transition> {
    let matches = |key: &[TerminalID]| {
        key.iter()
            .enumerate()
            .all(|(i, t)| input.get(i).copied().unwrap_or(TerminalID::END) == *t)
    };
    transitions
        .iter()
        .filter(|t| t.label.is_none() && !t.lookahead.is_empty())
        .filter(|t| {
            matches!(
                t.kind,
                TransitionKind::Shift(SymbolID::T(..))
                    | TransitionKind::Reduce(..)
                    | TransitionKind::Return(..)
                    | TransitionKind::ErrorPanic
            )
        })
        .find(|t| matches(&t.lookahead))
        .or_else(|| transitions.iter().find(|t| t.is_default()))
}
