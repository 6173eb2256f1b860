use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use multicaret_engine::editing::handle_default_typing;
use multicaret_engine::{Caret, MultiCaretData, for_each_caret};
mod common;

fn bench_per_caret_runs(c: &mut Criterion) {
    let mut group = c.benchmark_group("orchestrator");
    group.sample_size(10);

    for carets in [10, 100, 500] {
        let doc = common::document_with_line_carets(carets);

        group.bench_with_input(BenchmarkId::new("single_round", carets), &doc, |b, doc| {
            b.iter(|| {
                let mut d = doc.clone();
                let summary = for_each_caret(&mut d, |mut editor| async move {
                    handle_default_typing(&mut editor, "x")?;
                    anyhow::Ok(())
                });
                std::hint::black_box(summary)
            });
        });

        group.bench_with_input(BenchmarkId::new("three_rounds", carets), &doc, |b, doc| {
            b.iter(|| {
                let mut d = doc.clone();
                let summary = for_each_caret(&mut d, |mut editor| async move {
                    for text in ["a", "b", "c"] {
                        handle_default_typing(&mut editor, text)?;
                        editor.commit().await;
                    }
                    anyhow::Ok(())
                });
                std::hint::black_box(summary)
            });
        });

        group.bench_with_input(BenchmarkId::new("direct_typing", carets), &doc, |b, doc| {
            b.iter(|| {
                let mut d = doc.clone();
                std::hint::black_box(handle_default_typing(&mut d, "x"))
            });
        });
    }

    group.finish();
}

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");

    for count in [100, 1000] {
        let carets: Vec<Caret> = common::overlapping_positions(count)
            .into_iter()
            .map(Caret::new)
            .collect();

        group.bench_with_input(BenchmarkId::new("overlapping", count), &carets, |b, carets| {
            b.iter(|| {
                let merged = MultiCaretData::new(carets.clone(), carets[0].id());
                std::hint::black_box(merged)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_per_caret_runs, bench_merge);
criterion_main!(benches);
