use gtfs_copier::{CopyResult, CopyStatus};
use std::fmt::Write;

/// Per collection counts, then the retained errors and warnings
pub fn format_report(result: &CopyResult) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<22} {:>9} {:>9} {:>9} {:>8} {:>9}",
        "collection", "read", "written", "dropped", "errors", "warnings"
    );
    for c in &result.collections {
        let _ = writeln!(
            out,
            "{:<22} {:>9} {:>9} {:>9} {:>8} {:>9}",
            c.collection,
            c.read,
            c.written,
            c.dropped,
            c.error_count(),
            c.warning_count
        );
    }

    for c in &result.collections {
        if c.error_count() == 0 && c.warning_count == 0 {
            continue;
        }
        let _ = writeln!(out, "\n{}", c.collection);
        for (kind, count) in &c.errors_by_kind {
            let _ = writeln!(out, "  {count} {kind} error(s)");
        }
        for error in &c.errors {
            let _ = writeln!(out, "  error: {error}");
        }
        if c.errors.len() < c.error_count() {
            let _ = writeln!(out, "  ... {} more", c.error_count() - c.errors.len());
        }
        for warning in &c.warnings {
            let _ = writeln!(out, "  warning: {warning}");
        }
        if c.warnings.len() < c.warning_count {
            let _ = writeln!(out, "  ... {} more", c.warning_count - c.warnings.len());
        }
    }

    let status = match result.status {
        CopyStatus::Completed => "completed",
        CopyStatus::Cancelled => "cancelled",
    };
    let _ = writeln!(
        out,
        "\n{status}: {} error(s), {} warning(s)",
        result.error_count(),
        result.warning_count()
    );
    out
}

pub fn print_report(result: &CopyResult, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else {
        print!("{}", format_report(result));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gtfs_copier::CollectionReport;
    use gtfs_structures::{EntityError, ErrorKind};
    use std::collections::BTreeMap;

    fn result() -> CopyResult {
        CopyResult {
            status: CopyStatus::Completed,
            collections: vec![
                CollectionReport {
                    collection: "stops.txt".to_owned(),
                    read: 3,
                    written: 3,
                    ..Default::default()
                },
                CollectionReport {
                    collection: "trips.txt".to_owned(),
                    read: 2,
                    written: 1,
                    dropped: 1,
                    errors_by_kind: BTreeMap::from([(ErrorKind::Reference, 1)]),
                    errors: vec![EntityError::reference("route_id", "R1", "routes.txt")],
                    ..Default::default()
                },
            ],
        }
    }

    #[test]
    fn text_report() {
        let text = format_report(&result());
        assert!(text.contains("stops.txt"));
        assert!(text.contains("1 reference error(s)"));
        assert!(text.contains("value 'R1'"));
        assert!(text.ends_with("completed: 1 error(s), 0 warning(s)\n"));
    }

    #[test]
    fn json_report() {
        let json = serde_json::to_value(result()).unwrap();
        assert_eq!("completed", json["status"]);
        assert_eq!(1, json["collections"][1]["errors_by_kind"]["reference"]);
    }
}
