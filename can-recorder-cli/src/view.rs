//! Console rendering of the live table

use can_recorder::LiveTable;
use std::fmt::Write;

const RULE: &str = "───────────────────────────────────────────────────────────────";

/// Render the live table as fixed-width text
pub fn render(table: &LiveTable) -> String {
    let mut out = String::new();

    let _ = writeln!(
        out,
        "{:<10} {:>3}  {:<24} {:>8}  {:>10}",
        "CAN ID", "DLC", "Data", "Count", "Cycle (ms)"
    );
    let _ = writeln!(out, "{}", RULE);

    for row in table.rows() {
        let _ = writeln!(
            out,
            "{:<10} {:>3}  {:<24} {:>8}  {:>10}",
            row.id, row.dlc, row.data, row.count, row.cycle_time
        );
    }

    let _ = writeln!(out, "{}", RULE);
    let _ = write!(out, "Messages: {}", table.message_count());
    if let Some(status) = table.status() {
        let _ = write!(out, "  |  {}", status);
    }
    out.push('\n');
    out
}

/// Redraw the table in place on an ANSI terminal
pub fn redraw(table: &LiveTable) {
    print!("\x1B[2J\x1B[H{}", render(table));
}
