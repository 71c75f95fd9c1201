//! Shift/reduce conflict resolution by precedence and associativity.

use crate::grammar::{Assoc, Precedence};

/// Which alternatives survive a shift/reduce conflict.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Resolution {
    Shift,
    Reduce,
    /// Neither alternative survives and the input is rejected.
    Error,
    Unresolved,
}

/// Resolve a conflict between reducing a rule with precedence `reduce` and
/// shifting a token observed by rules with precedences `range`.
pub(crate) fn resolve(reduce: Option<Precedence>, range: &[Option<Precedence>]) -> Resolution {
    let Some(reduce) = reduce else {
        return Resolution::Unresolved;
    };
    let mut priorities = Vec::with_capacity(range.len());
    for prec in range {
        match prec {
            Some(prec) => priorities.push(prec.priority),
            None => return Resolution::Unresolved,
        }
    }
    let (Some(&high), Some(&low)) = (priorities.iter().max(), priorities.iter().min()) else {
        return Resolution::Unresolved;
    };

    let priority = reduce.priority;
    match (priority == high, priority == low) {
        _ if priority > high => Resolution::Reduce,
        _ if priority < low => Resolution::Shift,
        (true, true) => match reduce.assoc {
            Assoc::Left => Resolution::Reduce,
            Assoc::Right => Resolution::Shift,
            Assoc::Nonassoc => Resolution::Error,
        },
        (true, false) if reduce.assoc == Assoc::Left => Resolution::Reduce,
        (false, true) if reduce.assoc == Assoc::Right => Resolution::Shift,
        _ => Resolution::Unresolved,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const fn prec(priority: u16, assoc: Assoc) -> Option<Precedence> {
        Some(Precedence::new(priority, assoc))
    }

    #[test]
    fn distinct_priorities() {
        let range = [prec(1, Assoc::Left), prec(3, Assoc::Left)];
        assert_eq!(resolve(prec(4, Assoc::Left), &range), Resolution::Reduce);
        assert_eq!(resolve(prec(0, Assoc::Right), &range), Resolution::Shift);
        assert_eq!(resolve(prec(2, Assoc::Left), &range), Resolution::Unresolved);
    }

    #[test]
    fn equal_priorities_use_associativity() {
        let range = [prec(2, Assoc::Left)];
        assert_eq!(resolve(prec(2, Assoc::Left), &range), Resolution::Reduce);
        assert_eq!(resolve(prec(2, Assoc::Right), &range), Resolution::Shift);
        assert_eq!(resolve(prec(2, Assoc::Nonassoc), &range), Resolution::Error);
    }

    #[test]
    fn ties_at_one_end_of_the_range() {
        let range = [prec(1, Assoc::Left), prec(2, Assoc::Left)];
        assert_eq!(resolve(prec(2, Assoc::Left), &range), Resolution::Reduce);
        assert_eq!(resolve(prec(2, Assoc::Right), &range), Resolution::Unresolved);
        assert_eq!(resolve(prec(1, Assoc::Right), &range), Resolution::Shift);
        assert_eq!(resolve(prec(1, Assoc::Left), &range), Resolution::Unresolved);
        assert_eq!(resolve(prec(1, Assoc::Nonassoc), &range), Resolution::Unresolved);
    }

    #[test]
    fn missing_precedence_is_unresolved() {
        assert_eq!(
            resolve(None, &[prec(1, Assoc::Left)]),
            Resolution::Unresolved
        );
        assert_eq!(
            resolve(prec(1, Assoc::Left), &[prec(1, Assoc::Left), None]),
            Resolution::Unresolved
        );
        assert_eq!(resolve(prec(1, Assoc::Left), &[]), Resolution::Unresolved);
    }
}
