mod common;

use avaliacao_etl::{
    entity::Entity,
    error::EtlError,
    store,
    upload::{self, UploadOptions},
    workbook::read_workbook,
};
use common::{TestWorkspace, contract_csv, create_contract_tables, sorted_rows, text};
use encoding_rs::UTF_8;

fn full_workbook(ws: &TestWorkspace) -> std::path::PathBuf {
    let course = contract_csv(
        Entity::Course,
        &[&["C1", "Direito", "Humanas"], &["C1", "Direito", "Humanas"]],
    );
    let discipline = contract_csv(
        Entity::Discipline,
        &[&["D1", "Ética", "C1", "DIR", "P7", "Presencial"]],
    );
    let question = contract_csv(Entity::Question, &[&["Q1", "1", "T1", "O professor domina o conteúdo?"]]);
    let question_type = contract_csv(Entity::QuestionType, &[&["T1", "Didática"]]);
    let unit = contract_csv(Entity::Unit, &[&["CAMP", "Reitoria", "Campus Central"]]);
    let evaluation = contract_csv(
        Entity::Evaluation,
        &[
            &["S1", "Q1", "Concordo", "D1", "C1", "T1", "CAMP", "2023"],
            &["S1", "Q1", "Discordo", "D1", "C1", "T1", "CAMP", "2023"],
        ],
    );
    ws.workbook(
        "upload",
        &[
            ("dCurso", course.as_str()),
            ("dDisciplina", discipline.as_str()),
            ("dPergunta", question.as_str()),
            ("dTipoPergunta", question_type.as_str()),
            ("dUnidade", unit.as_str()),
            ("fAvaliacao", evaluation.as_str()),
            ("dProfessor", "Cod_Prof,Nome\nP7,Ana\n"),
        ],
    )
}

#[test]
fn valid_workbook_is_appended_to_published_tables() {
    let ws = TestWorkspace::new();
    let store = ws.open_store();
    create_contract_tables(&store);
    let workbook = read_workbook(&full_workbook(&ws), UTF_8).expect("read workbook");

    let report = upload::upload(store.conn(), &workbook, UploadOptions::default()).unwrap();

    assert_eq!(report.total, 7);
    let course = report
        .tables
        .iter()
        .find(|entry| entry.entity == Entity::Course)
        .expect("course entry");
    assert_eq!(course.rows, 1);
    assert_eq!(store::row_count(store.conn(), "fAvaliacao").unwrap(), 2);
    assert_eq!(
        sorted_rows(&store, "dUnidade", &["SiglaLotação", "Lotação"]),
        vec![vec![text("CAMP"), text("Campus Central")]]
    );
    assert!(!store::table_exists(store.conn(), "dProfessor").unwrap());
}

#[test]
fn keeping_duplicates_inserts_every_row() {
    let ws = TestWorkspace::new();
    let store = ws.open_store();
    create_contract_tables(&store);
    let workbook = read_workbook(&full_workbook(&ws), UTF_8).unwrap();
    let report = upload::upload(
        store.conn(),
        &workbook,
        UploadOptions {
            drop_duplicates: false,
        },
    )
    .unwrap();
    assert_eq!(report.total, 8);
    assert_eq!(store::row_count(store.conn(), "dCurso").unwrap(), 2);
}

#[test]
fn missing_sheets_are_all_named_and_nothing_is_written() {
    let ws = TestWorkspace::new();
    let store = ws.open_store();
    create_contract_tables(&store);
    let path = ws.workbook(
        "partial",
        &[
            ("dCurso", "Cod_Curso,Curso,Setor_Curso\nC1,Direito,Humanas\n"),
            ("dUnidade", "SiglaLotação,UnidadeGestora,Lotação\nCAMP,Reitoria,Central\n"),
        ],
    );
    let workbook = read_workbook(&path, UTF_8).unwrap();
    let err = upload::upload(store.conn(), &workbook, UploadOptions::default()).unwrap_err();
    match err {
        EtlError::MissingSheets { sheets } => assert_eq!(
            sheets,
            vec!["dDisciplina", "dPergunta", "dTipoPergunta", "fAvaliacao"]
        ),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(store::row_count(store.conn(), "dCurso").unwrap(), 0);
}

#[test]
fn missing_columns_name_the_sheet() {
    let ws = TestWorkspace::new();
    let store = ws.open_store();
    create_contract_tables(&store);
    let path = full_workbook(&ws);
    ws.write(
        "upload/dUnidade.csv",
        "SiglaLotação,UnidadeGestora\nCAMP,Reitoria\n",
    );
    let workbook = read_workbook(&path, UTF_8).unwrap();
    let err = upload::upload(store.conn(), &workbook, UploadOptions::default()).unwrap_err();
    match err {
        EtlError::MissingColumns { sheet, columns } => {
            assert_eq!(sheet, "dUnidade");
            assert_eq!(columns, vec!["Lotação"]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(store::row_count(store.conn(), "dCurso").unwrap(), 0);
}

#[test]
fn insert_failure_rolls_back_every_sheet() {
    let ws = TestWorkspace::new();
    let store = ws.open_store();
    create_contract_tables(&store);
    store
        .conn()
        .execute_batch("DROP TABLE fAvaliacao; CREATE TABLE fAvaliacao (ID_Pesquisa TEXT);")
        .unwrap();
    let workbook = read_workbook(&full_workbook(&ws), UTF_8).unwrap();

    let err = upload::upload(store.conn(), &workbook, UploadOptions::default()).unwrap_err();
    assert!(matches!(err, EtlError::Insert { ref table, .. } if table == "fAvaliacao"));
    for table in ["dCurso", "dDisciplina", "dPergunta", "dTipoPergunta", "dUnidade"] {
        assert_eq!(store::row_count(store.conn(), table).unwrap(), 0, "{table}");
    }
}
