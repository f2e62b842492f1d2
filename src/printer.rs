//! Fixed-width rendering of records and result sets.

use tracing::info;

use crate::error::{Result, StoreError};
use crate::models::{Customer, Invoice};
use crate::sqlite::{ResultSet, Row};

/// One-line rendering of a record
pub trait DisplayRow {
    fn display_line(&self) -> String;
}

fn opt(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("")
}

fn opt_id(id: Option<i64>) -> String {
    id.map(|i| i.to_string()).unwrap_or_default()
}

impl DisplayRow for Customer {
    fn display_line(&self) -> String {
        format!(
            "{:>2}, {:<6.6}, {:<15.15}, {}",
            opt_id(self.id),
            self.name,
            opt(&self.address),
            opt(&self.email)
        )
    }
}

impl DisplayRow for Invoice {
    fn display_line(&self) -> String {
        format!(
            "{:>2}, {:>2}, {:>6}, {}",
            opt_id(self.id),
            opt_id(self.custid),
            self.invno,
            self.amount
        )
    }
}

impl DisplayRow for Row {
    fn display_line(&self) -> String {
        self.values()
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

pub fn format_row<T: DisplayRow + ?Sized>(row: &T) -> String {
    row.display_line()
}

pub fn log_row<T: DisplayRow + ?Sized>(row: &T) {
    info!("{}", row.display_line());
}

/// Log every row; returns how many were logged
pub fn log_rows<'a, T, I>(rows: I) -> usize
where
    T: DisplayRow + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let mut count = 0;
    for row in rows {
        log_row(row);
        count += 1;
    }
    count
}

/// Log the rows of a result set. A result that was already consumed logs
/// nothing and counts as zero rows.
pub fn print_result(result: &mut ResultSet) -> Result<usize> {
    match result.fetch_all() {
        Ok(rows) => Ok(log_rows(&rows)),
        Err(StoreError::ResourceClosed) => Ok(0),
        Err(e) => Err(e),
    }
}

/// Render rows as a JSON array
pub fn render_json<T: serde::Serialize + ?Sized>(rows: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(rows)?)
}
