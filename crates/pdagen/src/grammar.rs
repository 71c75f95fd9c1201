//! Grammar types.

use crate::{types::Map, util::display_fn};
use std::{borrow::Cow, fmt};

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TerminalID {
    raw: u16,
}
impl TerminalID {
    /// Reserved symbol used as a terminal symbol that means the end of input.
    pub const END: Self = Self::new(0);

    /// Reserved symbol used as an error token.
    pub const ERROR: Self = Self::new(1);

    const OFFSET: u16 = 2;

    #[inline]
    const fn new(raw: u16) -> Self {
        Self { raw }
    }

    #[inline]
    pub const fn into_raw(self) -> u16 {
        self.raw
    }

    #[inline]
    pub const fn from_raw(raw: u16) -> Self {
        Self::new(raw)
    }
}
impl fmt::Debug for TerminalID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::END => write!(f, "T#End"),
            Self::ERROR => write!(f, "T#Error"),
            _ => write!(f, "T#{:03}", self.raw),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct TerminalSet {
    inner: bit_set::BitSet,
}
impl TerminalSet {
    pub fn insert(&mut self, id: TerminalID) -> bool {
        self.inner.insert(id.raw.into())
    }
    pub fn iter(&self) -> impl Iterator<Item = TerminalID> + '_ {
        self.inner.iter().map(|raw| TerminalID::new(raw as u16))
    }
}

#[derive(Debug)]
pub struct Terminal {
    id: TerminalID,
    export_name: Option<Cow<'static, str>>,
    precedence: Option<Precedence>,
}
impl Terminal {
    pub fn id(&self) -> TerminalID {
        self.id
    }
    pub fn export_name(&self) -> Option<&str> {
        self.export_name.as_deref()
    }
    pub fn precedence(&self) -> Option<Precedence> {
        self.precedence
    }
}
impl fmt::Display for Terminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            TerminalID::END => f.write_str("$end"),
            TerminalID::ERROR => f.write_str("$error"),
            _ => f.write_str(self.export_name().unwrap_or("<unknown>")),
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct NonterminalID {
    raw: u16,
}
impl NonterminalID {
    /// The sentinel nonterminal, always registered first and never given rules.
    pub const NONE: Self = Self::new(0);
    const OFFSET: u16 = 1;

    #[inline]
    const fn new(raw: u16) -> Self {
        Self { raw }
    }

    #[inline]
    pub const fn into_raw(self) -> u16 {
        self.raw
    }
}
impl fmt::Debug for NonterminalID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::NONE => write!(f, "N#None"),
            _ => write!(f, "N#{:03}", self.raw),
        }
    }
}

#[derive(Debug)]
pub struct Nonterminal {
    id: NonterminalID,
    export_name: Option<Cow<'static, str>>,
}
impl Nonterminal {
    pub fn id(&self) -> NonterminalID {
        self.id
    }
    pub fn export_name(&self) -> Option<&str> {
        self.export_name.as_deref()
    }
}
impl fmt::Display for Nonterminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            NonterminalID::NONE => f.write_str("$none"),
            _ => f.write_str(self.export_name().unwrap_or("<unknown>")),
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SymbolID {
    T(TerminalID),
    N(NonterminalID),
}
impl fmt::Debug for SymbolID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::T(t) => write!(f, "{:?}", t),
            Self::N(n) => write!(f, "{:?}", n),
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct RuleID {
    raw: u16,
}
impl RuleID {
    #[inline]
    const fn new(raw: u16) -> Self {
        Self { raw }
    }

    #[inline]
    pub const fn from_raw(raw: u16) -> Self {
        Self::new(raw)
    }

    /// The global index of this rule, in definition order.
    #[inline]
    pub const fn index(self) -> usize {
        self.raw as usize
    }
}
impl fmt::Debug for RuleID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R#{:03}", self.raw)
    }
}

/// The `%lookahead` directive attached to the end of a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookaheadDirective {
    /// Whether the terminal list names the lookaheads that must *not* follow.
    pub inverted: bool,
    pub terminals: Vec<TerminalID>,
}

/// The type that represents a production rule in grammar.
#[derive(Debug)]
pub struct Rule {
    id: RuleID,
    left: NonterminalID,
    right: Vec<SymbolID>,
    precedence: Option<Precedence>,
    lookahead: Option<LookaheadDirective>,
    error_until_lookahead: bool,
}
impl Rule {
    pub fn id(&self) -> RuleID {
        self.id
    }

    /// Return the left-hand side of this production.
    pub fn left(&self) -> NonterminalID {
        self.left
    }

    /// Return the right-hand side of this production.
    pub fn right(&self) -> &[SymbolID] {
        &self.right[..]
    }

    pub fn lookahead(&self) -> Option<&LookaheadDirective> {
        self.lookahead.as_ref()
    }

    /// Whether the `$error` tokens in this rule skip input until the
    /// lookahead directive is satisfied.
    pub fn is_error_until_lookahead(&self) -> bool {
        self.error_until_lookahead
    }

    pub fn precedence(&self, g: &Grammar) -> Option<Precedence> {
        match self.precedence {
            Some(prec) => Some(prec),
            None => {
                for symbol in self.right.iter().rev() {
                    if let SymbolID::T(t) = symbol {
                        if let Some(prec) = g.terminals[t].precedence() {
                            return Some(prec);
                        }
                    }
                }
                None
            }
        }
    }

    // `"LHS := R1 R2 R3"`
    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(|f| {
            write!(f, "{} := ", g.nonterminals[&self.left()])?;
            if self.right.is_empty() {
                f.write_str("@empty")?;
            }
            for (i, symbol) in self.right().iter().enumerate() {
                if i > 0 {
                    write!(f, " ")?;
                }
                write!(f, "{}", g.symbol_name(*symbol))?;
            }
            Ok(())
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub struct Precedence {
    pub priority: u16,
    pub assoc: Assoc,
}

impl Precedence {
    pub const fn new(priority: u16, assoc: Assoc) -> Self {
        Self { priority, assoc }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Assoc {
    Left,
    Right,
    Nonassoc,
}

impl fmt::Display for Assoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Left => write!(f, "left"),
            Self::Right => write!(f, "right"),
            Self::Nonassoc => write!(f, "nonassoc"),
        }
    }
}

/// The grammar definition used to derive the automata.
#[derive(Debug)]
#[non_exhaustive]
pub struct Grammar {
    pub terminals: Map<TerminalID, Terminal>,
    pub nonterminals: Map<NonterminalID, Nonterminal>,
    pub rules: Map<RuleID, Rule>,
    diagnostics: Vec<GrammarDiagnostic>,
}

impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "## terminals:")?;
        for terminal in self.terminals.values() {
            write!(f, "{}", terminal)?;
            if let Some(prec) = terminal.precedence() {
                write!(f, " (priority={}, assoc={})", prec.priority, prec.assoc)?;
            }
            writeln!(f)?;
        }

        writeln!(f, "\n## nonterminals:")?;
        for nonterminal in self.nonterminals.values() {
            writeln!(f, "{}", nonterminal)?;
        }

        writeln!(f, "\n## rules:")?;
        for rule in self.rules.values() {
            write!(f, "{}", rule.display(self))?;
            if let Some(prec) = &rule.precedence {
                write!(f, " (priority={}, assoc={})", prec.priority, prec.assoc)?;
            }
            if let Some(directive) = &rule.lookahead {
                f.write_str(if directive.inverted {
                    " %lookahead !["
                } else {
                    " %lookahead ["
                })?;
                for (i, t) in directive.terminals.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}", self.terminals[t])?;
                }
                f.write_str("]")?;
            }
            if rule.error_until_lookahead {
                f.write_str(" %error-until-lookahead")?;
            }
            writeln!(f)?;
        }

        Ok(())
    }
}

impl Grammar {
    /// Define a grammar using the specified function.
    ///
    /// Definition errors that do not prevent the construction (such as
    /// references to undeclared symbols) are accumulated and can be
    /// inspected through [`Grammar::diagnostics`].
    pub fn define<F>(f: F) -> Result<Self, GrammarDefError>
    where
        F: FnOnce(&mut GrammarDef) -> Result<(), GrammarDefError>,
    {
        let mut def = GrammarDef {
            terminals: Map::default(),
            nonterminals: Map::default(),
            rules: Map::default(),
            diagnostics: vec![],
            next_terminal_id: TerminalID::OFFSET,
            next_nonterminal_id: NonterminalID::OFFSET,
            next_rule_id: 0,
        };

        for id in [TerminalID::END, TerminalID::ERROR] {
            def.terminals.insert(
                id,
                Terminal {
                    id,
                    export_name: None,
                    precedence: None,
                },
            );
        }

        def.nonterminals.insert(
            NonterminalID::NONE,
            Nonterminal {
                id: NonterminalID::NONE,
                export_name: None,
            },
        );

        f(&mut def)?;

        Ok(def.end())
    }

    /// The non-fatal problems found while defining this grammar.
    pub fn diagnostics(&self) -> &[GrammarDiagnostic] {
        &self.diagnostics
    }

    pub fn rule(&self, id: RuleID) -> &Rule {
        &self.rules[&id]
    }

    /// Iterate over the rules whose left-hand side is `n`, in definition order.
    pub fn rules_of(&self, n: NonterminalID) -> impl Iterator<Item = &Rule> + '_ {
        self.rules.values().filter(move |rule| rule.left == n)
    }

    /// Find a declared symbol by its export name.
    pub fn symbol(&self, name: &str) -> Option<SymbolID> {
        find_symbol(&self.terminals, &self.nonterminals, name)
    }

    pub fn symbol_name(&self, symbol: SymbolID) -> impl fmt::Display + '_ {
        display_fn(move |f| match symbol {
            SymbolID::T(t) => write!(f, "{}", self.terminals[&t]),
            SymbolID::N(n) => write!(f, "{}", self.nonterminals[&n]),
        })
    }
}

fn find_symbol(
    terminals: &Map<TerminalID, Terminal>,
    nonterminals: &Map<NonterminalID, Nonterminal>,
    name: &str,
) -> Option<SymbolID> {
    terminals
        .values()
        .find(|t| t.export_name() == Some(name))
        .map(|t| SymbolID::T(t.id))
        .or_else(|| {
            nonterminals
                .values()
                .find(|n| n.export_name() == Some(name))
                .map(|n| SymbolID::N(n.id))
        })
}

/// The contextural values for building a `Grammar`.
#[derive(Debug)]
pub struct GrammarDef {
    terminals: Map<TerminalID, Terminal>,
    nonterminals: Map<NonterminalID, Nonterminal>,
    rules: Map<RuleID, Rule>,
    diagnostics: Vec<GrammarDiagnostic>,
    next_terminal_id: u16,
    next_nonterminal_id: u16,
    next_rule_id: u16,
}

impl GrammarDef {
    /// Declare a terminal symbol used in this grammar.
    pub fn terminal(
        &mut self,
        export_name: &str,
        precedence: Option<Precedence>,
    ) -> Result<TerminalID, GrammarDefError> {
        if !verify_ident(export_name) {
            return Err(GrammarDefError::Other {
                msg: format!("incorrect token name: `{}'", export_name),
            });
        }
        if find_symbol(&self.terminals, &self.nonterminals, export_name).is_some() {
            return Err(GrammarDefError::Other {
                msg: format!("The symbol `{}' has already been exported", export_name),
            });
        }

        let id = TerminalID::new(self.next_terminal_id);
        self.next_terminal_id += 1;

        self.terminals.insert(
            id,
            Terminal {
                id,
                export_name: Some(export_name.to_owned().into()),
                precedence,
            },
        );

        Ok(id)
    }

    /// Declare a nonterminal symbol used in this grammar.
    pub fn nonterminal(&mut self, export_name: &str) -> Result<NonterminalID, GrammarDefError> {
        if !verify_ident(export_name) {
            return Err(GrammarDefError::Other {
                msg: format!("incorrect symbol name: `{}'", export_name),
            });
        }
        if find_symbol(&self.terminals, &self.nonterminals, export_name).is_some() {
            return Err(GrammarDefError::Other {
                msg: format!("The symbol `{}' has already been exported", export_name),
            });
        }

        let id = NonterminalID::new(self.next_nonterminal_id);
        self.next_nonterminal_id += 1;

        self.nonterminals.insert(
            id,
            Nonterminal {
                id,
                export_name: Some(export_name.to_owned().into()),
            },
        );

        Ok(id)
    }

    /// Specify a production rule into this grammer.
    ///
    /// A rule identical to an already defined one is reported as a diagnostic
    /// and the identifier of the existing rule is returned.
    pub fn rule<I>(
        &mut self,
        left: NonterminalID,
        right: I,
        precedence: Option<Precedence>,
    ) -> Result<RuleID, GrammarDefError>
    where
        I: IntoIterator<Item = SymbolID>,
    {
        if left == NonterminalID::NONE || !self.nonterminals.contains_key(&left) {
            return Err(GrammarDefError::Other {
                msg: format!("unknown left-hand side: {:?}", left),
            });
        }
        let right: Vec<SymbolID> = right.into_iter().collect();
        for symbol in &right {
            let declared = match symbol {
                SymbolID::T(t) => self.terminals.contains_key(t) && *t != TerminalID::END,
                SymbolID::N(n) => self.nonterminals.contains_key(n) && *n != NonterminalID::NONE,
            };
            if !declared {
                return Err(GrammarDefError::Other {
                    msg: format!("unknown symbol in right-hand side: {:?}", symbol),
                });
            }
        }

        let existing = self
            .rules
            .values()
            .find(|rule| rule.left == left && rule.right == right)
            .map(|rule| rule.id);
        if let Some(existing) = existing {
            let left = self.nonterminal_name(left);
            self.diagnostics
                .push(GrammarDiagnostic::DuplicateRule { left });
            return Ok(existing);
        }

        let id = RuleID::new(self.next_rule_id);
        self.next_rule_id += 1;
        self.rules.insert(
            id,
            Rule {
                id,
                left,
                right,
                precedence,
                lookahead: None,
                error_until_lookahead: false,
            },
        );

        Ok(id)
    }

    /// Specify a production rule by the export names of its symbols.
    ///
    /// Undeclared names are reported as diagnostics, in which case the rule is
    /// skipped and `None` is returned.
    pub fn rule_by_names(
        &mut self,
        left: &str,
        right: &[&str],
        precedence: Option<Precedence>,
    ) -> Result<Option<RuleID>, GrammarDefError> {
        let mut resolved = Some(vec![]);
        for name in right {
            let symbol = match *name {
                "$error" => Some(SymbolID::T(TerminalID::ERROR)),
                name => find_symbol(&self.terminals, &self.nonterminals, name),
            };
            match symbol {
                Some(symbol) => {
                    if let Some(resolved) = &mut resolved {
                        resolved.push(symbol);
                    }
                }
                None => {
                    self.diagnostics.push(GrammarDiagnostic::UndeclaredSymbol {
                        name: (*name).to_owned(),
                        left: left.to_owned(),
                    });
                    resolved = None;
                }
            }
        }

        let left = match find_symbol(&self.terminals, &self.nonterminals, left) {
            Some(SymbolID::N(n)) => n,
            _ => {
                self.diagnostics.push(GrammarDiagnostic::UndeclaredSymbol {
                    name: left.to_owned(),
                    left: left.to_owned(),
                });
                return Ok(None);
            }
        };

        match resolved {
            Some(right) => self.rule(left, right, precedence).map(Some),
            None => Ok(None),
        }
    }

    /// Attach a `%lookahead` directive to the end of the specified rule.
    pub fn lookahead<I>(
        &mut self,
        rule: RuleID,
        inverted: bool,
        terminals: I,
    ) -> Result<(), GrammarDefError>
    where
        I: IntoIterator<Item = TerminalID>,
    {
        let terminals: Vec<TerminalID> = terminals.into_iter().collect();
        if let Some(t) = terminals.iter().find(|t| !self.terminals.contains_key(*t)) {
            return Err(GrammarDefError::Other {
                msg: format!("unknown terminal in lookahead directive: {:?}", t),
            });
        }
        let rule = self.rules.get_mut(&rule).ok_or("unknown rule")?;
        rule.lookahead.replace(LookaheadDirective {
            inverted,
            terminals,
        });
        Ok(())
    }

    /// Mark the `$error` tokens of the specified rule as skipping input until
    /// the lookahead directive is satisfied.
    pub fn error_until_lookahead(&mut self, rule: RuleID) -> Result<(), GrammarDefError> {
        let rule = self.rules.get_mut(&rule).ok_or("unknown rule")?;
        if !rule.right.contains(&SymbolID::T(TerminalID::ERROR)) {
            return Err("%error-until-lookahead requires an $error token in the rule".into());
        }
        rule.error_until_lookahead = true;
        Ok(())
    }

    fn nonterminal_name(&self, n: NonterminalID) -> String {
        self.nonterminals[&n].to_string()
    }

    fn end(mut self) -> Grammar {
        for nonterminal in self.nonterminals.values() {
            if nonterminal.id == NonterminalID::NONE {
                continue;
            }
            if self.rules.values().all(|rule| rule.left != nonterminal.id) {
                self.diagnostics.push(GrammarDiagnostic::EmptyNonterminal {
                    name: nonterminal.to_string(),
                });
            }
        }

        for diagnostic in &self.diagnostics {
            tracing::warn!("{}", diagnostic);
        }

        Grammar {
            terminals: self.terminals,
            nonterminals: self.nonterminals,
            rules: self.rules,
            diagnostics: self.diagnostics,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GrammarDefError {
    #[error("Other error: {}", msg)]
    Other { msg: String },
}
impl From<&str> for GrammarDefError {
    fn from(msg: &str) -> Self {
        Self::Other { msg: msg.into() }
    }
}
impl From<String> for GrammarDefError {
    fn from(msg: String) -> Self {
        Self::Other { msg }
    }
}

/// A problem in the grammar definition that does not stop its construction.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum GrammarDiagnostic {
    #[error("undeclared symbol `{name}' referenced by a rule of `{left}'")]
    UndeclaredSymbol { name: String, left: String },

    #[error("duplicate production rule of `{left}' ignored")]
    DuplicateRule { left: String },

    #[error("the nonterminal `{name}' has no associated production rule")]
    EmptyNonterminal { name: String },
}

fn verify_ident(mut s: &str) -> bool {
    if s.is_empty() {
        // The identifier must not be empty.
        return false;
    }

    if s.bytes().all(|b| b.is_ascii_digit()) {
        // The number must not be identifer.
        return false;
    }

    if let Some(raw) = s.strip_prefix("r#") {
        s = raw;
        if matches!(s, "crate" | "self" | "super" | "Self") {
            // unexpected raw identifier
            return false;
        }
    } else if is_strict_keyword(s) || is_reserved(s) {
        // Reserved keyword specified.
        return false;
    }

    let mut chars = s.chars();
    match chars.next() {
        Some(first) if is_ident_start(first) => (),
        // The identifier must be started with XID-Start.
        _ => return false,
    }
    if chars.any(|ch| !is_ident_continue(ch)) {
        // The idenfier must be continued with XID-Continue.
        return false;
    }

    true
}

fn is_ident_start(ch: char) -> bool {
    ch == '_' || unicode_ident::is_xid_start(ch)
}

fn is_ident_continue(ch: char) -> bool {
    unicode_ident::is_xid_continue(ch)
}

fn is_strict_keyword(s: &str) -> bool {
    matches!(
        s,
        "as" | "break" | "const" | "continue" | "crate" | "else" | "enum" | "extern"
        | "false" | "fn" | "for" | "if" | "impl" | "in" | "let" | "loop" | "match" | "mod"
        | "move" | "mut" | "pub" | "ref" | "return" | "self" | "Self" | "static" | "struct"
        | "super" | "trait" | "true" | "type" | "unsafe" | "use" | "where" | "while"
        // since Rust 2018
        | "async" | "await" | "dyn"
    )
}

fn is_reserved(s: &str) -> bool {
    matches!(
        s,
        "abstract" | "become" | "box" | "do" | "final" | "macro" | "override" | "priv"
        | "typeof" | "unsized" | "virtual" | "yield"
        // since Rust 2018
        | "try"
    )
}
