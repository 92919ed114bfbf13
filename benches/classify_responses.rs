use avaliacao_etl::responses::{self, DomainReport, Vocabulary};
use avaliacao_etl::store::Store;
use criterion::{BatchSize, Criterion, criterion_group, criterion_main};

const SAMPLES: &[&str] = &[
    "Concordo",
    "Concordo Totalmente",
    "Discordo",
    "Nem concordo nem discordo",
    "  neutro ",
    "Sim",
    "NÃO",
    "8403",
    "Discordo parcialmente",
    "",
];

fn generate_responses(rows: usize) -> Vec<String> {
    (0..rows)
        .map(|i| SAMPLES[i % SAMPLES.len()].to_string())
        .collect()
}

/// Mostly numeric junk codes, one distinct value per 25 rows.
fn generate_many_distinct(rows: usize) -> Vec<String> {
    (0..rows)
        .map(|i| match i % 25 {
            0 => SAMPLES[(i / 25) % SAMPLES.len()].to_string(),
            _ => (i / 25).to_string(),
        })
        .collect()
}

fn store_with_responses(responses: &[String]) -> Store {
    let store = Store::open_in_memory().expect("store");
    let conn = store.conn();
    conn.execute_batch("CREATE TABLE fAvaliacao (ID_Pesquisa TEXT, Resposta TEXT)")
        .expect("create fact");
    conn.execute_batch("BEGIN").expect("begin");
    {
        let mut insert = conn
            .prepare("INSERT INTO fAvaliacao VALUES ('S1', ?1)")
            .expect("prepare insert");
        for response in responses {
            insert.execute([response]).expect("insert response");
        }
    }
    conn.execute_batch("COMMIT").expect("commit");
    store
}

fn bench_classify(c: &mut Criterion) {
    let vocabulary = Vocabulary::builtin();
    let responses = generate_responses(50_000);

    let mut group = c.benchmark_group("classify_responses");

    group.bench_function("domain_report_in_memory", |b| {
        b.iter(|| {
            DomainReport::from_responses(responses.iter().map(|r| Some(r.as_str())), &vocabulary)
        });
    });

    group.bench_function("populate_store", |b| {
        b.iter_batched(
            || store_with_responses(&responses),
            |store| {
                responses::populate(store.conn(), "fAvaliacao", &vocabulary).expect("populate");
            },
            BatchSize::LargeInput,
        );
    });

    let many_distinct = generate_many_distinct(50_000);
    group.bench_function("populate_store_many_distinct", |b| {
        b.iter_batched(
            || store_with_responses(&many_distinct),
            |store| {
                responses::populate(store.conn(), "fAvaliacao", &vocabulary).expect("populate");
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_classify);
criterion_main!(benches);
