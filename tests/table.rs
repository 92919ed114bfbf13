use avaliacao_etl::table::Table;

#[test]
fn numeric_columns_are_right_aligned() {
    let mut table = Table::new(["table", "rows"]);
    table.push(["dCurso", "3"]).push(["fAvaliacao", "12"]);

    let rendered = table.render();
    let lines: Vec<&str> = rendered.lines().collect();

    assert_eq!(
        lines,
        vec![
            "table       rows",
            "----------  ----",
            "dCurso         3",
            "fAvaliacao    12",
        ]
    );
}

#[test]
fn control_characters_are_flattened() {
    let mut table = Table::new(["note"]);
    table.push(["line1\nline2\tvalue"]);

    let rendered = table.render();
    let lines: Vec<&str> = rendered.lines().collect();

    assert_eq!(lines.len(), 3);
    assert_eq!(lines[2], "line1 line2 value");
}

#[test]
fn widths_count_characters_not_bytes() {
    let mut table = Table::new(["Lotação", "status"]);
    table.push(["Reitoria", "ok"]).push(["Ética", "ok"]);

    let rendered = table.render();
    let lines: Vec<&str> = rendered.lines().collect();

    assert_eq!(lines[0], "Lotação   status");
    assert_eq!(lines[3], "Ética     ok");
}

#[test]
fn short_rows_are_padded_and_trailing_space_trimmed() {
    let mut table = Table::new(["a", "b", "c"]);
    assert!(table.is_empty());
    table.push(["x"]);

    let rendered = table.render();
    let lines: Vec<&str> = rendered.lines().collect();

    assert!(!table.is_empty());
    assert_eq!(lines[0], "a    b    c");
    assert_eq!(lines[1], "---  ---  ---");
    assert_eq!(lines[2], "x");
}
