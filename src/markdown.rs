//! Row extraction for the pipe tables the listing repositories publish.
//!
//! The parser only finds the table and splits rows into trimmed cells.
//! Column counts and cell contents are checked by the source adapters.

use std::str::Lines;

/// How the first line of a table is recognised. The marker line itself is
/// never yielded.
#[derive(Debug, Clone, Copy)]
pub enum Marker<'m> {
    /// Line contains the text anywhere, e.g. an HTML comment `<!-- TABLE_START -->`.
    Contains(&'m str),
    /// Line starts with the text, e.g. a literal header row.
    LinePrefix(&'m str),
}

impl Marker<'_> {
    pub fn matches(&self, line: &str) -> bool {
        match self {
            Marker::Contains(text) => line.contains(text),
            Marker::LinePrefix(text) => line.starts_with(text),
        }
    }
}

/// A row of a table together with the raw line it came from, so callers
/// can report the offending line when a row does not fit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow<'a> {
    pub raw: &'a str,
    pub cells: Vec<String>,
}

impl TableRow<'_> {
    pub fn cell(&self, index: usize) -> Option<&str> {
        self.cells.get(index).map(String::as_str)
    }
}

/// Lazily yields the rows of the first table found in `text`.
pub struct TableRows<'a, 'm> {
    lines: Lines<'a>,
    start: Marker<'m>,
    end: Option<Marker<'m>>,
    started: bool,
    finished: bool,
}

impl<'a, 'm> TableRows<'a, 'm> {
    pub fn new(text: &'a str, start: Marker<'m>, end: Option<Marker<'m>>) -> Self {
        Self {
            lines: text.lines(),
            start,
            end,
            started: false,
            finished: false,
        }
    }
}

impl<'a> Iterator for TableRows<'a, '_> {
    type Item = TableRow<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        while !self.started {
            let line = self.lines.next()?;
            if self.start.matches(line) {
                self.started = true;
            }
        }

        loop {
            let Some(line) = self.lines.next() else {
                self.finished = true;
                return None;
            };

            if let Some(end) = &self.end {
                if end.matches(line) {
                    self.finished = true;
                    return None;
                }
            }

            if line.trim().is_empty() {
                continue;
            }

            return Some(TableRow {
                raw: line,
                cells: split_row(line),
            });
        }
    }
}

/// Splits on every `|`, so a row written as `|a|b|` has empty first and
/// last cells and its data starts at index 1.
pub fn split_row(line: &str) -> Vec<String> {
    line.split('|').map(|cell| cell.trim().to_string()).collect()
}

/// True for `| --- | :---: |` style alignment rows.
pub fn is_separator_row(row: &TableRow) -> bool {
    let data: Vec<&String> = row.cells.iter().filter(|c| !c.is_empty()).collect();
    !data.is_empty()
        && data
            .iter()
            .all(|c| c.chars().all(|ch| ch == '-' || ch == ':'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_table_yields_single_row_and_stops() {
        let text = "TABLE_START\n|Company|Role|Loc|✅|\nTABLE_END\n|Leaked|Row|X|✅|";
        let rows: Vec<TableRow> = TableRows::new(
            text,
            Marker::Contains("TABLE_START"),
            Some(Marker::Contains("TABLE_END")),
        )
        .collect();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].cells, vec!["", "Company", "Role", "Loc", "✅", ""]);
        assert_eq!(rows[0].raw, "|Company|Role|Loc|✅|");
    }

    #[test]
    fn test_lines_before_start_are_discarded() {
        let text = "# Title\n| a | b |\n<!-- TABLE_START -->\n| c | d |";
        let rows: Vec<TableRow> =
            TableRows::new(text, Marker::Contains("TABLE_START"), None).collect();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].cell(1), Some("c"));
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        let text = "| Company| Location|\n\n   \n| Acme | NYC |\n\n| Beta | SF |";
        let rows: Vec<TableRow> =
            TableRows::new(text, Marker::LinePrefix("| Company| Location|"), None).collect();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].cell(1), Some("Beta"));
        assert_eq!(rows[1].cell(2), Some("SF"));
    }

    #[test]
    fn test_line_prefix_must_start_the_line() {
        let text = "  | Company| Location|\n| Acme | NYC |";
        let mut rows = TableRows::new(text, Marker::LinePrefix("| Company| Location|"), None);
        assert!(rows.next().is_none());
    }

    #[test]
    fn test_no_start_marker_yields_nothing() {
        let text = "| a | b |\n| c | d |";
        let mut rows = TableRows::new(text, Marker::Contains("TABLE_START"), None);
        assert!(rows.next().is_none());
        assert!(rows.next().is_none());
    }

    #[test]
    fn test_exhausted_iterator_stays_exhausted() {
        let text = "TABLE_START\n|a|\nTABLE_END\n|b|";
        let mut rows = TableRows::new(
            text,
            Marker::Contains("TABLE_START"),
            Some(Marker::Contains("TABLE_END")),
        );
        assert!(rows.next().is_some());
        assert!(rows.next().is_none());
        assert!(rows.next().is_none());
    }

    #[test]
    fn test_separator_rows() {
        let sep = TableRow { raw: "", cells: split_row("| ------- | :---: | --- |") };
        let data = TableRow { raw: "", cells: split_row("| Acme | - | NYC |") };
        assert!(is_separator_row(&sep));
        assert!(!is_separator_row(&data));
    }
}
