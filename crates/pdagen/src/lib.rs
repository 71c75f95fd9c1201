//! Construction of the pushdown automata behind a generated parser.

pub mod config;
pub mod dpda;
pub mod grammar;
pub mod graph;
pub mod npda;
pub mod simulator;
pub mod types;
mod util;

pub use crate::{
    config::Config,
    dpda::{Dpda, DpdaError, ReduceConflict},
    grammar::Grammar,
    npda::Npda,
};

/// Build the NPDA of the grammar and determinize it.
pub fn compute<'g>(grammar: &'g Grammar, config: &Config) -> Result<(Npda<'g>, Dpda), DpdaError> {
    let npda = npda::build(grammar, config);
    let dpda = dpda::determinize(&npda, config)?;
    Ok((npda, dpda))
}
