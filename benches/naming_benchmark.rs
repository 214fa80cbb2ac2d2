//! Benchmarks for file naming and document discovery
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pdf_png_mcp_server::pdf::discover_pdfs;
use pdf_png_mcp_server::source::sanitize_filename;

fn bench_sanitize(c: &mut Criterion) {
    let mut group = c.benchmark_group("sanitize_filename");

    let titles = [
        ("short", "Attention Is All You Need".to_string()),
        (
            "punctuated",
            "Deep Learning: A Survey <2024> / \"Revised\" | Part 1?".to_string(),
        ),
        ("overlong", "Very Long Title ".repeat(40)),
    ];

    for (name, title) in &titles {
        group.bench_with_input(BenchmarkId::from_parameter(name), title, |b, title| {
            b.iter(|| sanitize_filename(black_box(title)));
        });
    }

    group.finish();
}

fn bench_discovery(c: &mut Criterion) {
    let mut group = c.benchmark_group("discover_pdfs");

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    for folder in 0..10 {
        let sub = dir.path().join(format!("journal-{}", folder));
        std::fs::create_dir_all(&sub).expect("Failed to create folder");
        for paper in 0..20 {
            std::fs::write(sub.join(format!("paper-{}.pdf", paper)), b"%PDF-1.4")
                .expect("Failed to write fixture");
            std::fs::write(sub.join(format!("paper-{}-001.png", paper)), b"png")
                .expect("Failed to write fixture");
        }
    }

    for recursive in [false, true] {
        group.bench_with_input(
            BenchmarkId::new("200_documents", if recursive { "recursive" } else { "flat" }),
            &recursive,
            |b, &recursive| {
                b.iter(|| discover_pdfs(black_box(dir.path()), recursive).unwrap());
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_sanitize, bench_discovery);
criterion_main!(benches);
