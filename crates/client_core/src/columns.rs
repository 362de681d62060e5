/// Declarative column descriptor for a table view: a stable key (also the
/// field name passed to sort toggles), a header label, and a render
/// closure turning a row into display text. One set of descriptors per
/// entity replaces per-view rendering code.
pub struct Column<T> {
    key: &'static str,
    label: &'static str,
    render: Box<dyn Fn(&T) -> String + Send + Sync>,
}

impl<T> Column<T> {
    pub fn new(
        key: &'static str,
        label: &'static str,
        render: impl Fn(&T) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            key,
            label,
            render: Box::new(render),
        }
    }

    pub fn key(&self) -> &'static str {
        self.key
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn cell(&self, row: &T) -> String {
        (self.render)(row)
    }
}

/// Plain-text table for terminal output, columns padded to their widest
/// cell.
pub fn render_table<T>(columns: &[Column<T>], rows: &[T]) -> String {
    let mut widths: Vec<usize> = columns
        .iter()
        .map(|column| column.label().chars().count())
        .collect();
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .enumerate()
                .map(|(index, column)| {
                    let cell = column.cell(row);
                    widths[index] = widths[index].max(cell.chars().count());
                    cell
                })
                .collect()
        })
        .collect();

    let mut out = String::new();
    for (index, column) in columns.iter().enumerate() {
        if index > 0 {
            out.push_str("  ");
        }
        out.push_str(&pad(column.label(), widths[index]));
    }
    out.push('\n');
    for (index, width) in widths.iter().enumerate() {
        if index > 0 {
            out.push_str("  ");
        }
        out.push_str(&"-".repeat(*width));
    }
    out.push('\n');
    for row in &cells {
        for (index, cell) in row.iter().enumerate() {
            if index > 0 {
                out.push_str("  ");
            }
            out.push_str(&pad(cell, widths[index]));
        }
        out.push('\n');
    }
    out
}

fn pad(text: &str, width: usize) -> String {
    let mut padded = text.to_string();
    let missing = width.saturating_sub(text.chars().count());
    padded.extend(std::iter::repeat(' ').take(missing));
    padded
}
