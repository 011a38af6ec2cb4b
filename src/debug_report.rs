use goldweave::{
    AgreementReport, ConsolidationSummary, CoverageReport, DisagreementReason, LinkRun, StageMetrics, ValidationReport,
    ViolationKind,
};
use std::fmt::Display;
use std::path::Path;

/// SGR styles used by the report.
#[derive(Debug, Clone, Copy)]
enum Tone {
    Bold,
    Dim,
    Red,
    Green,
    Yellow,
    Blue,
    Cyan,
    Gray,
}

impl Tone {
    fn sgr(self) -> &'static str {
        match self {
            Tone::Bold => "1",
            Tone::Dim => "2",
            Tone::Red => "31",
            Tone::Green => "32",
            Tone::Yellow => "33",
            Tone::Blue => "34",
            Tone::Cyan => "36",
            Tone::Gray => "90",
        }
    }
}

/// Styles text when color output is on; otherwise passes it through.
struct Palette(bool);

impl Palette {
    fn paint(&self, s: impl Display, tone: Tone) -> String {
        if self.0 { format!("\x1b[{}m{s}\x1b[0m", tone.sgr()) } else { s.to_string() }
    }
}

fn header(palette: &Palette, title: &str) {
    println!("\n{}", palette.paint(format!("━━━ {title} ━━━"), Tone::Gray));
}

fn ratio(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.3}"))
}

pub fn print_agreement(report: &AgreementReport, color: bool) {
    let palette = Palette(color);
    header(&palette, "Agreement");
    println!(
        "  {} {}  {} {:.2}",
        palette.paint("mode:", Tone::Dim),
        palette.paint(report.mode.to_string(), Tone::Blue),
        palette.paint("threshold:", Tone::Dim),
        report.threshold
    );
    println!(
        "  A: {}  │  B: {}  │  matched: {}  │  F1: {}",
        palette.paint(report.total_a.to_string(), Tone::Cyan),
        palette.paint(report.total_b.to_string(), Tone::Cyan),
        palette.paint(report.matched.to_string(), Tone::Green),
        palette.paint(ratio(report.f1()), Tone::Bold),
    );
    let type_ratio = (report.matched > 0).then(|| report.type_agreements() as f64 / report.matched as f64);
    println!("  type agreement on matched: {}", palette.paint(ratio(type_ratio), Tone::Bold));

    println!(
        "  {} {}  {} {}  {} {}",
        palette.paint("missing_in_A:", Tone::Dim),
        palette.paint(report.count(DisagreementReason::MissingInA).to_string(), Tone::Yellow),
        palette.paint("missing_in_B:", Tone::Dim),
        palette.paint(report.count(DisagreementReason::MissingInB).to_string(), Tone::Yellow),
        palette.paint("type_mismatch:", Tone::Dim),
        palette.paint(report.count(DisagreementReason::TypeMismatch).to_string(), Tone::Yellow),
    );

    let confusions = report.top_confusions(10);
    if !confusions.is_empty() {
        println!("\n  {}", palette.paint("Top confusions (A → B)", Tone::Bold));
        for (a, b, count) in confusions {
            println!("    {} → {}  {}", palette.paint(a, Tone::Blue), palette.paint(b, Tone::Blue), palette.paint(count.to_string(), Tone::Dim));
        }
    }
}

pub fn print_consolidation(summary: &ConsolidationSummary, color: bool) {
    let palette = Palette(color);
    header(&palette, "Gold");
    println!(
        "  rows: {}  │  adjudicated: {}  │  agreed: {}  │  tiebreak: {}",
        palette.paint(summary.total().to_string(), Tone::Bold),
        palette.paint(summary.adjudicated.to_string(), Tone::Cyan),
        palette.paint(summary.agreed.to_string(), Tone::Green),
        palette.paint(summary.tiebreak.to_string(), Tone::Yellow),
    );
}

pub fn print_coverage(coverage: &CoverageReport, color: bool) {
    let palette = Palette(color);
    header(&palette, &format!("Coverage: {}", coverage.work_slug));
    println!(
        "  mentions: {}  │  ambiguous skipped: {}",
        palette.paint(coverage.total_mentions.to_string(), Tone::Green),
        palette.paint(coverage.ambiguous_skipped.to_string(), Tone::Yellow),
    );
    let mut types: Vec<&String> = coverage.mentions_by_type.keys().chain(coverage.ambiguous_by_type.keys()).collect();
    types.sort();
    types.dedup();
    for ty in types {
        println!(
            "    {:<14} {}  {}",
            palette.paint(ty, Tone::Blue),
            coverage.mentions_by_type.get(ty).copied().unwrap_or(0),
            palette.paint(format!("skipped {}", coverage.ambiguous_by_type.get(ty).copied().unwrap_or(0)), Tone::Dim),
        );
    }
}

pub fn print_link(run: &LinkRun, color: bool) {
    let palette = Palette(color);
    header(&palette, "Linking");
    let count = |reason: &str| run.unlinked.iter().filter(|u| u.reason() == reason).count();
    println!(
        "  linked: {}  │  no_match: {}  │  ambiguous: {}  │  unknown_type: {}",
        palette.paint(run.linked.len().to_string(), Tone::Green),
        palette.paint(count("no_match").to_string(), Tone::Yellow),
        palette.paint(count("ambiguous").to_string(), Tone::Yellow),
        palette.paint(count("unknown_type").to_string(), Tone::Red),
    );
}

/// Validation failures go to stderr; they accompany a non-zero exit.
pub fn print_validation(report: &ValidationReport, color: bool) {
    let palette = Palette(color);
    eprintln!(
        "{} {}",
        palette.paint(palette.paint("✗ validation failed:", Tone::Red), Tone::Bold),
        palette.paint(format!(
            "{} shape, {} bounds, {} consistency",
            report.count(ViolationKind::Shape),
            report.count(ViolationKind::Bounds),
            report.count(ViolationKind::Consistency)
        ), Tone::Dim),
    );
    for v in &report.violations {
        let kind_color = match v.kind {
            ViolationKind::Shape => Tone::Red,
            ViolationKind::Bounds => Tone::Yellow,
            ViolationKind::Consistency => Tone::Cyan,
        };
        eprintln!(
            "  {} {} {}",
            palette.paint(format!("line {:>5}", v.line), Tone::Gray),
            palette.paint(format!("{:<11}", v.kind.to_string()), kind_color),
            v.detail
        );
    }
}

pub fn print_written(path: &Path, rows: usize, color: bool) {
    let palette = Palette(color);
    println!(
        "{} {} {}",
        palette.paint("✓", Tone::Green),
        palette.paint(rows.to_string(), Tone::Bold),
        palette.paint(format!("row(s) → {}", path.display()), Tone::Dim)
    );
}

pub fn print_timing(stages: &[StageMetrics], color: bool) {
    if stages.is_empty() {
        return;
    }
    let palette = Palette(color);
    header(&palette, "Timing");
    for stage in stages {
        let throughput = stage.throughput().map(|t| format!("{t:.0} rows/s")).unwrap_or_default();
        println!(
            "  {:<12} {}  {} → {}  {}",
            palette.paint(stage.stage, Tone::Cyan),
            palette.paint(format!("{:?}", stage.duration), Tone::Green),
            stage.input_rows,
            stage.output_rows,
            palette.paint(throughput, Tone::Dim),
        );
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_only_styles_when_enabled() {
        assert_eq!(Palette(false).paint(42, Tone::Red), "42");
        assert_eq!(Palette(true).paint("ok", Tone::Gray), "\x1b[90mok\x1b[0m");
        assert_eq!(ratio(None), "n/a");
        assert_eq!(ratio(Some(2.0 / 3.0)), "0.667");
    }
}
