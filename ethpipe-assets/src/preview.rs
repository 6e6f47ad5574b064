//! Markdown preview of transaction rows.

use ethpipe::TransactionRecord;

/// Rows shown when no explicit limit is given.
pub const DEFAULT_PREVIEW_ROWS: usize = 10;

/// Rendered in place of a table when there is nothing to show.
pub const NO_ROWS: &str = "(no rows)";

const HEADERS: [&str; 11] = [
    "block_number",
    "block_timestamp",
    "hash",
    "from",
    "to",
    "value_wei",
    "gas",
    "max_fee_per_gas",
    "max_priority_fee_per_gas",
    "nonce",
    "transaction_index",
];

/// Render the first `limit` rows as a Markdown table with a leading row
/// index column.
#[must_use]
pub fn markdown(rows: &[TransactionRecord], limit: usize) -> String {
    if rows.is_empty() || limit == 0 {
        return NO_ROWS.to_owned();
    }

    let mut lines = Vec::with_capacity(limit.min(rows.len()) + 2);
    lines.push(format!("|    | {} |", HEADERS.join(" | ")));
    lines.push(format!("|---:|{}", "---|".repeat(HEADERS.len())));

    for (i, r) in rows.iter().take(limit).enumerate() {
        let cells = [
            r.block_number.to_string(),
            r.block_timestamp.to_rfc3339(),
            format!("{:#x}", r.hash),
            format!("{:#x}", r.from),
            r.to.map(|a| format!("{a:#x}")).unwrap_or_default(),
            r.value_wei.to_string(),
            r.gas.to_string(),
            r.max_fee_per_gas.map(|v| v.to_string()).unwrap_or_default(),
            r.max_priority_fee_per_gas
                .map(|v| v.to_string())
                .unwrap_or_default(),
            r.nonce.to_string(),
            r.transaction_index.to_string(),
        ];
        lines.push(format!("| {i} | {} |", cells.join(" | ")));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::synthetic_block;

    #[test]
    fn empty_is_placeholder() {
        assert_eq!(markdown(&[], DEFAULT_PREVIEW_ROWS), NO_ROWS);
        let rows = synthetic_block(1, 2).transactions;
        assert_eq!(markdown(&rows, 0), NO_ROWS);
    }

    #[test]
    fn limits_rows_and_keeps_header() {
        let rows = synthetic_block(8, 25).transactions;
        let table = markdown(&rows, DEFAULT_PREVIEW_ROWS);
        let lines: Vec<_> = table.lines().collect();

        assert_eq!(lines.len(), 2 + DEFAULT_PREVIEW_ROWS);
        assert!(lines[0].contains("max_priority_fee_per_gas"), "header lists columns");
        assert!(lines[2].starts_with("| 0 | 8 | "), "first row: {}", lines[2]);
        assert!(lines[11].starts_with("| 9 | "), "last row: {}", lines[11]);
    }

    #[test]
    fn every_row_has_all_cells() {
        let rows = synthetic_block(6, 3).transactions;
        let table = markdown(&rows, DEFAULT_PREVIEW_ROWS);
        let widths: Vec<_> = table.lines().map(|l| l.matches('|').count()).collect();
        assert!(widths.iter().all(|w| *w == HEADERS.len() + 2), "{widths:?}");
    }

    #[test]
    fn contract_creation_has_empty_recipient() {
        // (6 + 1) is a multiple of 7.
        let rows = synthetic_block(6, 2).transactions;
        let table = markdown(&rows, DEFAULT_PREVIEW_ROWS);
        let creation = table.lines().nth(3).unwrap();
        let cells: Vec<_> = creation.split(" | ").collect();
        assert_eq!(cells[5], "", "empty `to` cell: {creation}");
        assert!(cells[4].starts_with("0x"), "`from` is set: {creation}");
    }
}
