//! Line-oriented document model with a heading index.

use std::ops::Range;

/// Lines starting with this marker open a section.
pub const HEADING_MARKER: &str = "## ";

/// Location of one section: its heading line and the body lines up to the
/// next heading (or the end of the document).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub heading: usize,
    pub body: Range<usize>,
}

/// A dashboard document as an ordered sequence of lines.
///
/// Parsing and rendering round-trip exactly, including a trailing newline
/// and any `\r` carried by individual lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    lines: Vec<String>,
    trailing_newline: bool,
}

impl Document {
    pub fn parse(text: &str) -> Self {
        if text.is_empty() {
            return Self {
                lines: Vec::new(),
                trailing_newline: false,
            };
        }
        let trailing_newline = text.ends_with('\n');
        let body = if trailing_newline {
            &text[..text.len() - 1]
        } else {
            text
        };
        Self {
            lines: body.split('\n').map(String::from).collect(),
            trailing_newline,
        }
    }

    pub fn render(&self) -> String {
        let mut out = self.lines.join("\n");
        if self.trailing_newline {
            out.push('\n');
        }
        out
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Index of every section in document order.
    pub fn sections(&self) -> Vec<Section> {
        let headings: Vec<usize> = self
            .lines
            .iter()
            .enumerate()
            .filter(|(_, line)| is_heading(line))
            .map(|(i, _)| i)
            .collect();

        headings
            .iter()
            .enumerate()
            .map(|(n, &heading)| {
                let end = headings.get(n + 1).copied().unwrap_or(self.lines.len());
                Section {
                    heading,
                    body: heading + 1..end,
                }
            })
            .collect()
    }

    /// First section whose heading contains `keyword`.
    pub fn section(&self, keyword: &str) -> Option<Section> {
        self.sections()
            .into_iter()
            .find(|s| self.lines[s.heading].contains(keyword))
    }

    /// Body lines of the section named by `keyword`.
    pub fn section_body(&self, keyword: &str) -> Option<&[String]> {
        self.section(keyword).map(|s| &self.lines[s.body])
    }

    /// Append `line` to the end of a section's content, ahead of the blank
    /// lines that separate it from the next heading. A section with no
    /// content gets the line directly under its heading.
    ///
    /// Returns `false` (and changes nothing) when no heading contains
    /// `keyword`.
    pub fn append_line(&mut self, keyword: &str, line: &str) -> bool {
        let Some(section) = self.section(keyword) else {
            return false;
        };
        let at = self.content_end(&section);
        self.lines.insert(at, single_line(line));
        true
    }

    /// Replace a section's content lines with `body`, keeping the heading
    /// and the trailing blank separator.
    pub fn replace_section_body<I, S>(&mut self, keyword: &str, body: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let Some(section) = self.section(keyword) else {
            return false;
        };
        let end = self.content_end(&section);
        let replacement: Vec<String> = body.into_iter().map(|l| single_line(l.as_ref())).collect();
        self.lines.splice(section.body.start..end, replacement);
        true
    }

    /// Insert `rows` directly below the header-separator row of the first
    /// markdown table in the section, newest rows on top.
    ///
    /// Returns `false` when the section or its table separator is missing.
    pub fn append_table_rows<I, S>(&mut self, keyword: &str, rows: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let Some(section) = self.section(keyword) else {
            return false;
        };
        let Some(separator) = section
            .body
            .clone()
            .find(|&i| is_table_separator(&self.lines[i]))
        else {
            return false;
        };
        let at = separator + 1;
        let rows: Vec<String> = rows.into_iter().map(|r| single_line(r.as_ref())).collect();
        self.lines.splice(at..at, rows);
        true
    }

    /// Rewrite the text after `marker` on the first line containing it,
    /// wherever that line is.
    ///
    /// Emphasis (`*`, `_`) closing the marker is kept, and so is a `:`
    /// directly after the marker or its emphasis. Everything else after the
    /// marker is replaced: `**Last Updated**: old` becomes
    /// `**Last Updated**: <timestamp>` and `Last Updated 09:00` becomes
    /// `Last Updated: <timestamp>`.
    pub fn refresh_timestamp(&mut self, marker: &str, timestamp: &str) -> bool {
        let Some(line) = self.lines.iter_mut().find(|l| l.contains(marker)) else {
            return false;
        };
        let Some(pos) = line.find(marker) else {
            return false;
        };
        let after_marker = pos + marker.len();
        let rest = &line[after_marker..];
        let emphasis = rest.len() - rest.trim_start_matches(['*', '_']).len();
        let padded = rest.len()
            - rest
                .trim_start_matches(|c: char| c == '*' || c == '_' || c == ' ' || c == '\t')
                .len();
        let keep = if rest[padded..].starts_with(':') {
            after_marker + padded + 1
        } else {
            after_marker + emphasis
        };
        let has_colon = keep > after_marker + emphasis;
        let carriage = line.ends_with('\r');

        let mut updated = line[..keep].to_string();
        if !has_colon {
            updated.push(':');
        }
        updated.push(' ');
        updated.push_str(timestamp);
        if carriage {
            updated.push('\r');
        }
        *line = updated;
        true
    }

    fn content_end(&self, section: &Section) -> usize {
        section
            .body
            .clone()
            .rev()
            .find(|&i| !self.lines[i].trim().is_empty())
            .map_or(section.body.start, |i| i + 1)
    }
}

/// Render one markdown table row. Cells are escaped and flattened to a
/// single line; empty cells render as `-`.
pub fn table_row<S: AsRef<str>>(cells: &[S]) -> String {
    let cells: Vec<String> = cells.iter().map(|c| escape_cell(c.as_ref())).collect();
    format!("| {} |", cells.join(" | "))
}

fn escape_cell(cell: &str) -> String {
    let cell = cell.trim();
    if cell.is_empty() {
        return "-".to_string();
    }
    cell.replace('\r', "")
        .replace('\n', " ")
        .replace('|', "\\|")
}

fn is_heading(line: &str) -> bool {
    line.starts_with(HEADING_MARKER)
}

fn is_table_separator(line: &str) -> bool {
    line.starts_with('|') && line.contains("---")
}

fn single_line(line: &str) -> String {
    line.replace("\r\n", " ").replace(['\r', '\n'], " ")
}
