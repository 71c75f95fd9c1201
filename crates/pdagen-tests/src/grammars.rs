//! Grammar definition for integration tests.

use pdagen::grammar::{
    Assoc, GrammarDef, GrammarDefError, Precedence,
    SymbolID::{N, T},
    TerminalID,
};

/// `S := a S b | a b`
pub fn nested(g: &mut GrammarDef) -> Result<(), GrammarDefError> {
    let a = g.terminal("a", None)?;
    let b = g.terminal("b", None)?;
    let s = g.nonterminal("S")?;

    g.rule(s, [T(a), N(s), T(b)], None)?;
    g.rule(s, [T(a), T(b)], None)?;

    Ok(())
}

fn arithmetic(g: &mut GrammarDef, add: Assoc) -> Result<(), GrammarDefError> {
    let plus = g.terminal("PLUS", Some(Precedence::new(0, add)))?;
    let star = g.terminal("STAR", Some(Precedence::new(1, Assoc::Left)))?;
    let num = g.terminal("NUM", None)?;
    let e = g.nonterminal("E")?;

    g.rule(e, [N(e), T(plus), N(e)], None)?;
    g.rule(e, [N(e), T(star), N(e)], None)?;
    g.rule(e, [T(num)], None)?;

    Ok(())
}

/// `E := E PLUS E | E STAR E | NUM` with `PLUS` below `STAR`, both left-associative.
pub fn arithmetic_left(g: &mut GrammarDef) -> Result<(), GrammarDefError> {
    arithmetic(g, Assoc::Left)
}

/// Same as [`arithmetic_left`], but `PLUS` is right-associative.
pub fn arithmetic_right(g: &mut GrammarDef) -> Result<(), GrammarDefError> {
    arithmetic(g, Assoc::Right)
}

/// `E := E EQ E | NUM` with a non-associative `EQ`.
pub fn comparison(g: &mut GrammarDef) -> Result<(), GrammarDefError> {
    let eq = g.terminal("EQ", Some(Precedence::new(0, Assoc::Nonassoc)))?;
    let num = g.terminal("NUM", None)?;
    let e = g.nonterminal("E")?;

    g.rule(e, [N(e), T(eq), N(e)], None)?;
    g.rule(e, [T(num)], None)?;

    Ok(())
}

/// Requires two tokens of lookahead after `a`.
///
/// ```text
/// S := A x y | a x z
/// A := a
/// ```
pub fn lookahead2(g: &mut GrammarDef) -> Result<(), GrammarDefError> {
    let a = g.terminal("a", None)?;
    let x = g.terminal("x", None)?;
    let y = g.terminal("y", None)?;
    let z = g.terminal("z", None)?;
    let s = g.nonterminal("S")?;
    let n = g.nonterminal("A")?;

    g.rule(s, [N(n), T(x), T(y)], None)?;
    g.rule(s, [T(a), T(x), T(z)], None)?;
    g.rule(n, [T(a)], None)?;

    Ok(())
}

/// A reduce/reduce conflict on `x`, where `A := x` is defined first.
pub fn reduce_reduce(g: &mut GrammarDef) -> Result<(), GrammarDefError> {
    let x = g.terminal("x", None)?;
    let y = g.terminal("y", None)?;
    let s = g.nonterminal("S")?;
    let a = g.nonterminal("A")?;
    let b = g.nonterminal("B")?;

    g.rule(s, [N(b), T(y)], None)?;
    g.rule(s, [N(a), T(y)], None)?;
    g.rule(a, [T(x)], None)?;
    g.rule(b, [T(x)], None)?;

    Ok(())
}

/// `E := E + T | T`, `T := ( E ) | n`
pub fn parens(g: &mut GrammarDef) -> Result<(), GrammarDefError> {
    let plus = g.terminal("PLUS", None)?;
    let lparen = g.terminal("LPAREN", None)?;
    let rparen = g.terminal("RPAREN", None)?;
    let num = g.terminal("NUM", None)?;

    let e = g.nonterminal("E")?;
    let t = g.nonterminal("T")?;

    g.rule(e, [N(e), T(plus), N(t)], None)?;
    g.rule(e, [N(t)], None)?;
    g.rule(t, [T(lparen), N(e), T(rparen)], None)?;
    g.rule(t, [T(num)], None)?;

    Ok(())
}

/// The classic unambiguous expression grammar.
pub fn expr(g: &mut GrammarDef) -> Result<(), GrammarDefError> {
    let lparen = g.terminal("LPAREN", None)?;
    let rparen = g.terminal("RPAREN", None)?;
    let plus = g.terminal("PLUS", None)?;
    let minus = g.terminal("MINUS", None)?;
    let star = g.terminal("STAR", None)?;
    let slash = g.terminal("SLASH", None)?;
    let num = g.terminal("NUM", None)?;

    let expr = g.nonterminal("EXPR")?;
    let factor = g.nonterminal("FACTOR")?;
    let term = g.nonterminal("TERM")?;

    g.rule(expr, [N(expr), T(plus), N(factor)], None)?;
    g.rule(expr, [N(expr), T(minus), N(factor)], None)?;
    g.rule(expr, [N(factor)], None)?;
    g.rule(factor, [N(factor), T(star), N(term)], None)?;
    g.rule(factor, [N(factor), T(slash), N(term)], None)?;
    g.rule(factor, [N(term)], None)?;
    g.rule(term, [T(num)], None)?;
    g.rule(term, [T(lparen), N(expr), T(rparen)], None)?;

    Ok(())
}

/// A list of statements whose blocks recover from errors until the closing brace.
///
/// ```text
/// STMTS := STMTS STMT | STMT
/// STMT  := ID SEMI | LBRACE $error RBRACE    %error-until-lookahead
/// ```
pub fn recovery(g: &mut GrammarDef) -> Result<(), GrammarDefError> {
    let ident = g.terminal("ID", None)?;
    let semi = g.terminal("SEMI", None)?;
    let lbrace = g.terminal("LBRACE", None)?;
    let rbrace = g.terminal("RBRACE", None)?;

    let stmts = g.nonterminal("STMTS")?;
    let stmt = g.nonterminal("STMT")?;

    g.rule(stmts, [N(stmts), N(stmt)], None)?;
    g.rule(stmts, [N(stmt)], None)?;
    g.rule(stmt, [T(ident), T(semi)], None)?;
    let block = g.rule(stmt, [T(lbrace), T(TerminalID::ERROR), T(rbrace)], None)?;
    g.error_until_lookahead(block)?;

    Ok(())
}

/// Statements separated by newlines, where an expression statement must not
/// be followed by an opening parenthesis.
///
/// ```text
/// LIST := LIST NL STMT | STMT
/// STMT := ID                   %lookahead ![LPAREN]
///       | ID LPAREN RPAREN
/// ```
pub fn lookahead_directive(g: &mut GrammarDef) -> Result<(), GrammarDefError> {
    let ident = g.terminal("ID", None)?;
    let nl = g.terminal("NL", None)?;
    let lparen = g.terminal("LPAREN", None)?;
    let rparen = g.terminal("RPAREN", None)?;

    let list = g.nonterminal("LIST")?;
    let stmt = g.nonterminal("STMT")?;

    g.rule(list, [N(list), T(nl), N(stmt)], None)?;
    g.rule(list, [N(stmt)], None)?;
    let name = g.rule(stmt, [T(ident)], None)?;
    g.lookahead(name, true, [lparen])?;
    g.rule(stmt, [T(ident), T(lparen), T(rparen)], None)?;

    Ok(())
}

/// A grammar written by names, containing a few definition mistakes.
pub fn sloppy(g: &mut GrammarDef) -> Result<(), GrammarDefError> {
    g.terminal("ID", None)?;
    g.terminal("COMMA", None)?;
    g.nonterminal("LIST")?;
    g.nonterminal("UNUSED")?;

    g.rule_by_names("LIST", &["LIST", "COMMA", "ID"], None)?;
    g.rule_by_names("LIST", &["ID"], None)?;
    g.rule_by_names("LIST", &["ID"], None)?;
    g.rule_by_names("LIST", &["LIST", "SEMI", "ID"], None)?;

    Ok(())
}
