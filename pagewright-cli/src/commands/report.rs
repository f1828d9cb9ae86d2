//! Diagnostic output shared by `build` and `verify`.

use pagewright_core::BuildReport;

/// Print every diagnostic not suppressed by an `ignore` policy to stderr.
pub fn print_diagnostics(report: &BuildReport) {
    for diagnostic in report.visible() {
        eprintln!("{}", diagnostic);
    }
}

pub fn summary_line(report: &BuildReport) -> String {
    format!(
        "{} error(s), {} warning(s), {} ignored",
        report.errors().count(),
        report.warnings().count(),
        report.len() - report.visible().count()
    )
}
