//! Terminal output for the organizer commands.

use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, Color, ContentArrangement, Table};
use organizer_core::executor::MoveOutcome;
use organizer_core::indexer::{IndexStats, SearchHit};
use organizer_core::pipeline::BatchSummary;
use std::path::Path;

const NAME_WIDTH: usize = 40;

/// Cuts `s` to `width` characters, marking the cut with `...`.
pub fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_string();
    }
    let kept: String = s.chars().take(width.saturating_sub(3)).collect();
    format!("{kept}...")
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// One line per file: `✓ name → Category/Label/name`, `- name skipped: reason`
/// or `✗ name - reason`.
pub fn outcome_line(outcome: &MoveOutcome, output_root: &Path) -> String {
    let name = display_name(outcome.source());
    match outcome {
        MoveOutcome::Recorded { destination, .. } => {
            let shown = destination.strip_prefix(output_root).unwrap_or(destination);
            format!("✓ {name} → {}", shown.display())
        }
        MoveOutcome::Skipped { reason, .. } => format!("- {name} skipped: {reason}"),
        MoveOutcome::Failed { reason, .. } => format!("✗ {name} - {reason}"),
    }
}

pub fn print_batch(summary: &BatchSummary, output_root: &Path) {
    if summary.discovered == 0 {
        println!("Nothing to organize.");
        return;
    }
    for report in &summary.reports {
        println!("{}", outcome_line(&report.outcome, output_root));
    }
    println!(
        "\n{} organized, {} skipped, {} failed ({} found)",
        summary.organized, summary.skipped, summary.failed, summary.discovered
    );
}

pub fn search_table(hits: &[SearchHit]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);
    let header: Vec<Cell> = ["File Name", "Category", "AI Label", "Confidence", "Date"]
        .iter()
        .map(|h| Cell::new(h).fg(Color::Cyan))
        .collect();
    table.set_header(header);
    for hit in hits {
        let record = &hit.record;
        let date: String = record.classified_date.chars().take(19).collect();
        table.add_row(vec![
            Cell::new(truncate(&display_name(&record.file_path), NAME_WIDTH)),
            Cell::new(&record.category),
            Cell::new(&record.label),
            Cell::new(format!("{:.2}", record.confidence)),
            Cell::new(date.replace('T', " ")),
        ]);
    }
    table
}

pub fn print_stats(stats: &IndexStats) {
    println!("Total files: {}", stats.total_files);
    println!("Total size: {:.2} MB", stats.total_size_mb);
    if stats.categories.is_empty() {
        return;
    }
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec!["Category", "Files"]);
    for (category, count) in &stats.categories {
        table.add_row(vec![category.clone(), count.to_string()]);
    }
    println!("{table}");
}
