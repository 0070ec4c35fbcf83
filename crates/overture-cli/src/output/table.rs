//! Table formatting.

use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table as ComfyTable, presets};

/// Borderless table with bold headers and optional colored cells.
#[derive(Debug)]
pub struct Table {
    inner: ComfyTable,
    colors_enabled: bool,
}

impl Table {
    /// Create an empty table.
    pub fn new() -> Self {
        let mut inner = ComfyTable::new();
        inner.load_preset(presets::NOTHING);
        inner.set_content_arrangement(ContentArrangement::Dynamic);
        Self {
            inner,
            colors_enabled: super::colors_enabled(),
        }
    }

    /// Set the headers.
    pub fn headers<I, T>(&mut self, headers: I) -> &mut Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let cells: Vec<Cell> = headers
            .into_iter()
            .map(|h| {
                let cell = Cell::new(h.as_ref());
                if self.colors_enabled {
                    cell.add_attribute(Attribute::Bold)
                } else {
                    cell
                }
            })
            .collect();
        self.inner.set_header(cells);
        self
    }

    /// Add a plain row.
    pub fn row<I, T>(&mut self, row: I) -> &mut Self
    where
        I: IntoIterator<Item = T>,
        T: std::fmt::Display,
    {
        self.inner.add_row(row.into_iter().map(|c| Cell::new(c)).collect::<Vec<_>>());
        self
    }

    /// Add a row of prepared cells.
    pub fn styled_row(&mut self, cells: Vec<Cell>) -> &mut Self {
        self.inner.add_row(cells);
        self
    }

    /// Plain cell.
    pub fn cell(&self, text: impl std::fmt::Display) -> Cell {
        Cell::new(text)
    }

    /// Green cell.
    pub fn success_cell(&self, text: impl std::fmt::Display) -> Cell {
        self.colored(text, Color::Green)
    }

    /// Red cell.
    pub fn error_cell(&self, text: impl std::fmt::Display) -> Cell {
        self.colored(text, Color::Red)
    }

    /// Yellow cell.
    pub fn warning_cell(&self, text: impl std::fmt::Display) -> Cell {
        self.colored(text, Color::Yellow)
    }

    /// Grey cell.
    pub fn dim_cell(&self, text: impl std::fmt::Display) -> Cell {
        self.colored(text, Color::DarkGrey)
    }

    fn colored(&self, text: impl std::fmt::Display, color: Color) -> Cell {
        let cell = Cell::new(text);
        if self.colors_enabled { cell.fg(color) } else { cell }
    }

    /// Whether no rows were added.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Print to stdout.
    pub fn print(&self) {
        println!("{}", self.inner);
    }
}

impl Default for Table {
    fn default() -> Self {
        Self::new()
    }
}
