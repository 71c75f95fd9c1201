use criterion::{criterion_group, criterion_main, Criterion};
use pdagen::{
    grammar::{Grammar, GrammarDef, GrammarDefError},
    Config,
};
use pdagen_tests::grammars;
use std::hint::black_box;

criterion_main!(benches);
criterion_group!(benches, bench_small, bench_expressions, bench_lookahead);

fn bench_small(c: &mut Criterion) {
    bench_compute(c, "nested", grammars::nested);
    bench_compute(c, "reduce_reduce", grammars::reduce_reduce);
}

fn bench_expressions(c: &mut Criterion) {
    bench_compute(c, "arithmetic_left", grammars::arithmetic_left);
    bench_compute(c, "parens", grammars::parens);
    bench_compute(c, "expr", grammars::expr);
}

fn bench_lookahead(c: &mut Criterion) {
    bench_compute(c, "lookahead2", grammars::lookahead2);
    bench_compute(c, "lookahead_directive", grammars::lookahead_directive);
    bench_compute(c, "recovery", grammars::recovery);
}

fn bench_compute(
    c: &mut Criterion,
    name: &str,
    f: impl FnOnce(&mut GrammarDef) -> Result<(), GrammarDefError>,
) {
    let grammar = Grammar::define(f).expect("invalid grammar");
    let config = Config::default();
    c.bench_function(name, |b| {
        b.iter(|| {
            let _automata = black_box(pdagen::compute(&grammar, &config));
        });
    });
}
