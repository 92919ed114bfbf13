//! Plain-text tables for terminal reports.
//!
//! Columns are separated by two spaces. Numeric columns are right-aligned;
//! a column counts as numeric when every non-empty cell parses as a number.

use std::{borrow::Cow, fmt::Write as _};

#[derive(Debug, Clone, Default)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Appends a row, padded or truncated to the header width.
    pub fn push<I, S>(&mut self, cells: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        let mut row = cells
            .into_iter()
            .map(|cell| cell.to_string())
            .collect::<Vec<_>>();
        row.resize(self.headers.len(), String::new());
        self.rows.push(row);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn render(&self) -> String {
        let widths = self.widths();
        let numeric = (0..self.headers.len())
            .map(|idx| self.is_numeric_column(idx))
            .collect::<Vec<_>>();

        let mut output = String::new();
        let _ = writeln!(output, "{}", format_line(&self.headers, &widths, &numeric));
        let rule = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>();
        let _ = writeln!(output, "{}", format_line(&rule, &widths, &numeric));
        for row in &self.rows {
            let _ = writeln!(output, "{}", format_line(row, &widths, &numeric));
        }
        output
    }

    pub fn print(&self) {
        print!("{}", self.render());
    }

    fn widths(&self) -> Vec<usize> {
        let mut widths = self
            .headers
            .iter()
            .map(|h| display_width(h).max(3))
            .collect::<Vec<_>>();
        for row in &self.rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(display_width(&sanitize_cell(cell)));
            }
        }
        widths
    }

    fn is_numeric_column(&self, idx: usize) -> bool {
        let mut cells = self
            .rows
            .iter()
            .map(|row| row[idx].trim())
            .filter(|cell| !cell.is_empty())
            .peekable();
        cells.peek().is_some() && cells.all(|cell| cell.parse::<f64>().is_ok())
    }
}

fn format_line(cells: &[String], widths: &[usize], numeric: &[bool]) -> String {
    let mut line = cells
        .iter()
        .zip(widths)
        .zip(numeric)
        .map(|((cell, &width), &right)| {
            let cell = sanitize_cell(cell);
            let padding = " ".repeat(width.saturating_sub(display_width(&cell)));
            if right {
                format!("{padding}{cell}")
            } else {
                format!("{cell}{padding}")
            }
        })
        .collect::<Vec<_>>()
        .join("  ");
    line.truncate(line.trim_end().len());
    line
}

fn display_width(value: &str) -> usize {
    value.chars().count()
}

fn sanitize_cell(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}
