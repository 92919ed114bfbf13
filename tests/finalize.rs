mod common;

use avaliacao_etl::{
    entity::Entity,
    finalize::{self, FinalizeOutcome},
    staging,
    store::{self, Store},
    workbook::Sheet,
};
use common::{sorted_rows, text};

fn staged_courses(store: &Store) {
    let sheet = Sheet::from_strs(
        "dCurso",
        &["Cod_Curso", "Curso"],
        &[&["1", "A"], &["1", "A"], &["2", "B"]],
    );
    staging::append(store.conn(), Entity::Course, &sheet).expect("stage");
}

#[test]
fn finalizing_twice_yields_the_same_row_set() {
    let store = Store::open_in_memory().expect("store");
    staged_courses(&store);

    finalize::finalize(store.conn(), Entity::Course).unwrap();
    let first = sorted_rows(&store, "dCurso", &["Cod_Curso", "Curso"]);
    finalize::finalize(store.conn(), Entity::Course).unwrap();
    let second = sorted_rows(&store, "dCurso", &["Cod_Curso", "Curso"]);

    assert_eq!(first, second);
    assert_eq!(
        first,
        vec![vec![text("1"), text("A")], vec![text("2"), text("B")]]
    );
}

#[test]
fn finalize_replaces_rather_than_merges() {
    let store = Store::open_in_memory().expect("store");
    staged_courses(&store);
    finalize::finalize(store.conn(), Entity::Course).unwrap();

    staging::reset(store.conn()).unwrap();
    let sheet = Sheet::from_strs("dCurso", &["Cod_Curso", "Curso"], &[&["9", "Z"]]);
    staging::append(store.conn(), Entity::Course, &sheet).unwrap();
    finalize::finalize(store.conn(), Entity::Course).unwrap();

    assert_eq!(
        sorted_rows(&store, "dCurso", &["Cod_Curso", "Curso"]),
        vec![vec![text("9"), text("Z")]]
    );
}

#[test]
fn finalize_all_reports_each_entity() {
    let store = Store::open_in_memory().expect("store");
    staged_courses(&store);
    let reports = finalize::finalize_all(store.conn()).unwrap();
    assert_eq!(reports.len(), Entity::ALL.len());
    for report in &reports {
        match (&report.entity, &report.outcome) {
            (Entity::Course, FinalizeOutcome::Published { staged, distinct }) => {
                assert_eq!((*staged, *distinct), (3, 2));
            }
            (Entity::Course, other) => panic!("course not published: {other:?}"),
            (_, outcome) => assert!(matches!(outcome, FinalizeOutcome::Skipped { .. })),
        }
    }
    assert!(!store::table_exists(store.conn(), "dUnidade").unwrap());
    // Staging survives so finalization can be repeated.
    assert_eq!(store::row_count(store.conn(), "stg_dCurso").unwrap(), 3);
}
