use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use censo_rank::config::PipelineConfig;
use censo_rank::ingest::Ingestor;
use censo_rank::store::{AggregateStore, MemoryStore};
use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use tempfile::TempDir;

const HEADER: &str = "NU_ANO_CENSO;NO_UF;SG_UF;CO_UF;NO_MUNICIPIO;CO_MUNICIPIO;NO_ENTIDADE;CO_ENTIDADE;QT_MAT_BAS;QT_MAT_FUND;QT_MAT_MED;QT_MAT_INF";

fn write_extract(path: &Path, rows: usize, entities: usize, offset: usize) {
    let file = File::create(path).expect("create extract");
    let mut writer = BufWriter::new(file);
    writeln!(writer, "{HEADER}").expect("header");
    for i in 0..rows {
        let code = 35_000_000 + (i + offset) % entities;
        writeln!(
            writer,
            "2023;Sao Paulo;SP;35;Campinas;3509502;Escola {code};{code};{};{};{};{}",
            i % 90,
            i % 40,
            i % 30,
            i % 7
        )
        .expect("row");
    }
    writer.flush().expect("flush extract");
}

fn generate_sources(files: usize, rows: usize, entities: usize) -> TempDir {
    let temp_dir = tempfile::tempdir().expect("temp dir");
    for idx in 0..files {
        let path = temp_dir
            .path()
            .join(format!("microdados_ed_basica_2023_{idx:02}.csv"));
        write_extract(&path, rows, entities, idx * 17);
    }
    temp_dir
}

fn ingestor_for(dir: &Path) -> Ingestor {
    let config = PipelineConfig {
        source_dir: dir.to_path_buf(),
        ..PipelineConfig::default()
    };
    Ingestor::from_config(&config).expect("ingestor")
}

fn bench_aggregate_throughput(c: &mut Criterion) {
    let temp_dir = generate_sources(4, 25_000, 5_000);
    let ingestor = ingestor_for(temp_dir.path());
    let files = ingestor.discover_sources().expect("sources");

    let mut group = c.benchmark_group("aggregate");
    group.sample_size(20);

    group.bench_function("single_file", |b| {
        b.iter(|| ingestor.aggregate_files(&files[..1], 2023));
    });

    group.bench_function("four_files_parallel", |b| {
        b.iter(|| ingestor.aggregate_files(&files, 2023));
    });

    group.bench_function("ingest_into_memory_store", |b| {
        b.iter_batched(
            MemoryStore::new,
            |store| {
                ingestor.ingest_year(&store, 2023).expect("ingest");
                store
            },
            BatchSize::SmallInput,
        );
    });

    let populated = MemoryStore::new();
    ingestor
        .ingest_year(&populated, 2023)
        .expect("populate store");
    group.bench_function("top_10", |b| {
        b.iter(|| populated.top_n(2023, 10).expect("top_n"));
    });

    group.finish();
    drop(temp_dir);
}

criterion_group!(benches, bench_aggregate_throughput);
criterion_main!(benches);
