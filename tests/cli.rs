mod common;

use std::{fs, path::PathBuf};

use assert_cmd::Command;
use common::TestWorkspace;
use predicates::str::contains;
use serde_json::Value;

fn bin() -> Command {
    let mut cmd = Command::cargo_bin("avaliacao-etl").expect("binary exists");
    cmd.env("RUST_LOG", "off");
    cmd
}

fn arg(path: &std::path::Path) -> &str {
    path.to_str().expect("utf-8 path")
}

fn survey_workbook(ws: &TestWorkspace) -> PathBuf {
    ws.workbook(
        "survey",
        &[
            ("dCurso", "Cod_Curso,Curso,Setor_Curso\nC1,Direito,Humanas\n"),
            ("dUnidade", "SiglaLotação,UnidadeGestora,Lotação\nCAMP,Reitoria,Central\n"),
            (
                "dDisciplina",
                "Cod_Disciplina,Nome_Disciplina,Cod_Curso,Departamento,Cod_Prof,Modalidade\n\
                 D1,Ética,C1,DIR,P1,Presencial\n",
            ),
            ("dPergunta", "ID_Pergunta,Ordem,TipoPergunta,Pergunta\nQ1,1,T1,Clareza\n"),
            ("dTipoPergunta", "TipoPergunta,GrupoDePergunta\nT1,Didática\n"),
            (
                "fAvaliacao",
                "ID_Pesquisa,ID_Pergunta,Resposta,Cod_Disciplina,Cod_Curso,TipoPergunta,SiglaLotação,Ano\n\
                 S1,Q1,Concordo,D1,C1,T1,CAMP,2023\n\
                 S1,Q1,8403,D1,X99,T1,CAMP,2023\n\
                 S2,Q1,8403,D1,C1,T1,CAMP,2023\n",
            ),
            ("Planilha1", "a,b\n1,2\n"),
        ],
    )
}

fn rebuild(ws: &TestWorkspace, input: &std::path::Path) {
    bin()
        .args(["rebuild", "-i", arg(input), "--db", arg(&ws.db_path())])
        .assert()
        .success();
}

#[test]
fn rebuild_prints_run_summary_with_curation() {
    let ws = TestWorkspace::new();
    let input = survey_workbook(&ws);
    bin()
        .args(["rebuild", "-i", arg(&input), "--db", arg(&ws.db_path())])
        .assert()
        .success()
        .stdout(contains("Published tables"))
        .stdout(contains("(unclassified)"))
        .stdout(contains("Referential integrity after curation"))
        .stdout(contains("Total orphan rows: 0"))
        .stdout(contains("8403"));
    assert!(ws.db_path().exists());
}

#[test]
fn rebuild_json_reports_volume_and_orphans() {
    let ws = TestWorkspace::new();
    let input = survey_workbook(&ws);
    let output = bin()
        .args([
            "rebuild",
            "-i",
            arg(&input),
            "--db",
            arg(&ws.db_path()),
            "--no-curate",
            "--json",
        ])
        .output()
        .expect("run rebuild");
    assert!(output.status.success());
    let report: Value = serde_json::from_slice(&output.stdout).expect("json report");
    assert_eq!(report["volume"]["fact_rows_read"], 3);
    assert_eq!(report["volume"]["fact_rows_published"], 3);
    assert!(report["integrity_after"].is_null());
    assert_eq!(report["curation"].as_array().map(Vec::len), Some(0));
}

#[test]
fn strict_rebuild_fails_when_orphans_remain() {
    let ws = TestWorkspace::new();
    let input = survey_workbook(&ws);
    bin()
        .args([
            "rebuild",
            "-i",
            arg(&input),
            "--db",
            arg(&ws.db_path()),
            "--no-curate",
            "--strict",
        ])
        .assert()
        .failure()
        .stderr(contains("orphan row(s) remain after curation"));
}

#[test]
fn rebuild_requires_an_input() {
    let ws = TestWorkspace::new();
    bin()
        .args(["rebuild", "--db", arg(&ws.db_path())])
        .assert()
        .failure()
        .stderr(contains("At least one input workbook must be provided"));
}

#[test]
fn rebuild_reads_inputs_and_database_from_config() {
    let ws = TestWorkspace::new();
    survey_workbook(&ws);
    let config = ws.write(
        "etl.yaml",
        "database: out/etl.sqlite\ninputs:\n  - survey\ncuration:\n  enabled: false\n",
    );
    bin()
        .args(["rebuild", "-c", arg(&config)])
        .assert()
        .success()
        .stdout(contains("Total orphan rows: 1"));
    assert!(ws.path().join("out/etl.sqlite").exists());
}

#[test]
fn audit_and_responses_read_an_existing_store() {
    let ws = TestWorkspace::new();
    let input = survey_workbook(&ws);
    rebuild(&ws, &input);

    bin()
        .args(["audit", "--db", arg(&ws.db_path())])
        .assert()
        .success()
        .stdout(contains("fAvaliacao.Cod_Curso"))
        .stdout(contains("Total orphan rows: 0"));

    let export = ws.path().join("reports/unmapped.csv");
    bin()
        .args([
            "responses",
            "--db",
            arg(&ws.db_path()),
            "--output",
            arg(&export),
        ])
        .assert()
        .success()
        .stdout(contains("Total responses: 3 (66.7% unmapped)"));
    assert_eq!(
        fs::read_to_string(&export).expect("read export"),
        "value,count\n8403,2\n"
    );
}

#[test]
fn audit_json_lists_table_sizes() {
    let ws = TestWorkspace::new();
    let input = survey_workbook(&ws);
    rebuild(&ws, &input);
    let output = bin()
        .args(["audit", "--db", arg(&ws.db_path()), "--json"])
        .output()
        .expect("run audit");
    assert!(output.status.success());
    let report: Value = serde_json::from_slice(&output.stdout).expect("json report");
    let tables = report["tables"].as_array().expect("tables array");
    assert_eq!(tables.len(), 6);
    assert!(
        tables
            .iter()
            .any(|entry| entry["table"] == "dCurso" && entry["rows"] == 2)
    );
}

#[test]
fn commands_on_a_missing_store_fail_clearly() {
    let ws = TestWorkspace::new();
    for command in ["audit", "responses", "maintain"] {
        bin()
            .args([command, "--db", arg(&ws.db_path())])
            .assert()
            .failure()
            .stderr(contains("does not exist; run `rebuild` first"));
    }
    assert!(!ws.db_path().exists());
}

#[test]
fn upload_refuses_a_missing_store() {
    let ws = TestWorkspace::new();
    let input = survey_workbook(&ws);
    bin()
        .args(["upload", "-i", arg(&input), "--db", arg(&ws.db_path())])
        .assert()
        .failure()
        .stderr(contains("does not exist; run `rebuild` before uploading"));
    assert!(!ws.db_path().exists());
}

#[test]
fn upload_names_missing_sheets() {
    let ws = TestWorkspace::new();
    let input = ws.workbook(
        "partial",
        &[("dCurso", "Cod_Curso,Curso,Setor_Curso\nC1,Direito,Humanas\n")],
    );
    bin()
        .args(["upload", "-i", arg(&input), "--db", arg(&ws.db_path())])
        .assert()
        .failure()
        .stderr(contains(
            "missing required sheet(s): dDisciplina, dPergunta, dTipoPergunta, dUnidade, fAvaliacao",
        ));
}

#[test]
fn upload_appends_after_rebuild_and_maintain_derives_columns() {
    let ws = TestWorkspace::new();
    let input = survey_workbook(&ws);
    rebuild(&ws, &input);

    bin()
        .args(["upload", "-i", arg(&input), "--db", arg(&ws.db_path())])
        .assert()
        .success()
        .stdout(contains("Total rows inserted: 8"));

    bin()
        .args(["maintain", "--db", arg(&ws.db_path())])
        .assert()
        .success()
        .stdout(contains("Surrogate keys: already assigned, unchanged"))
        .stdout(contains("3 row(s) classified"));
}

#[test]
fn inspect_shows_routing_without_a_store() {
    let ws = TestWorkspace::new();
    let input = ws.workbook(
        "drift",
        &[
            ("CursosAvaliados", "Código Curso,Resposta\nC1,Sim\n"),
            ("Planilha1", "a\n1\n"),
        ],
    );
    bin()
        .args(["inspect", "-i", arg(&input)])
        .assert()
        .success()
        .stdout(contains("fAvaliacao"))
        .stdout(contains("Cod_Curso, Resposta"))
        .stdout(contains("(unclassified)"));
}

#[test]
fn config_prints_effective_yaml() {
    let ws = TestWorkspace::new();
    let config = ws.write("etl.yaml", "audit:\n  sample_size: 7\n");
    bin()
        .args(["config", "-c", arg(&config)])
        .assert()
        .success()
        .stdout(contains("sample_size: 7"))
        .stdout(contains("drop_duplicates: true"));
}

#[test]
fn config_rejects_unknown_keys() {
    let ws = TestWorkspace::new();
    let config = ws.write("etl.yaml", "sample: 7\n");
    bin()
        .args(["config", "-c", arg(&config)])
        .assert()
        .failure()
        .stderr(contains("Parsing configuration file"));
}
