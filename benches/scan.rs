//! Performance benchmarks for reference extraction.
//!
//! Run with: `cargo bench --bench scan`
//!
//! ## Performance Targets
//!
//! | Operation | Target | Notes |
//! |-----------|--------|-------|
//! | Field-targeted candidates | <5ms for 10k lines | No filesystem access |
//! | Quoted-literal candidates | <10ms for 10k lines | Over-collects |
//! | Rewrite text | <20ms for 10k lines | 500 mapped sources |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::path::{Path, PathBuf};

use scene_gather::{
    DocumentFormat, DocumentRewriter, ReferenceScanner, RewriteMap, ScanStrategy, SequencePattern,
};

/// Build a document with `objects` object blocks, each holding a plain
/// filename line, a nested value block and some unrelated strings.
fn make_document(objects: usize) -> String {
    let mut text = String::new();
    for i in 0..objects {
        text.push_str(&format!(
            "GeometryPolyfile \"geo_{i}\" {{\n    name \"object {i}\"\n    filename \"/show/geo/asset_{i}.abc\"\n    TextureMapFile \"tex_{i}\" {{\n        filename {{\n            value \"$PDIR/../tex/asset_{i}_<UDIM>.png\"\n        }}\n    }}\n}}\n"
        ));
    }
    text.push_str("#preferences\n    filename \"/ignored/after/footer.abc\"\n");
    text
}

fn scanner(strategy: ScanStrategy) -> ReferenceScanner {
    let format = DocumentFormat {
        strategy,
        ..DocumentFormat::default()
    };
    ReferenceScanner::new(format, SequencePattern::default())
}

/// Benchmark candidate extraction for both strategies.
fn bench_candidates(c: &mut Criterion) {
    let mut group = c.benchmark_group("candidates");

    for objects in [100usize, 1_000] {
        let text = make_document(objects);
        group.throughput(Throughput::Bytes(text.len() as u64));

        for strategy in [ScanStrategy::FieldTargeted, ScanStrategy::QuotedLiteral] {
            let scanner = scanner(strategy);
            group.bench_with_input(
                BenchmarkId::new(strategy.to_string(), objects),
                &text,
                |b, text| b.iter(|| black_box(scanner.candidates(black_box(text)))),
            );
        }
    }

    group.finish();
}

/// Benchmark single-pass rewriting against a large map.
fn bench_rewrite(c: &mut Criterion) {
    let mut group = c.benchmark_group("rewrite_text");
    let rewriter = DocumentRewriter::new(DocumentFormat::default());
    let document = Path::new("/gathered/project/scene.project");

    for objects in [100usize, 500] {
        let text = make_document(objects);
        let mut map = RewriteMap::new();
        for i in 0..objects {
            map.relocate(
                &PathBuf::from(format!("/show/geo/asset_{i}.abc")),
                &PathBuf::from(format!("/gathered/abc/asset_{i}.abc")),
            );
        }
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(objects), &text, |b, text| {
            b.iter(|| black_box(rewriter.rewrite_text(black_box(text), document, &map, true)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_candidates, bench_rewrite);
criterion_main!(benches);
