//! Text summary builder for CLI output.
//!
//! This module formats human-readable lines for a tracked run in text mode.

use crate::logbook::Logbook;
use crate::model::{ArtifactKind, RunOutcome};
use crate::orchestrator::TrackedRun;

/// Pre-formatted lines for text output.
pub struct TextSummary {
    pub lines: Vec<String>,
}

/// Build a text summary from a finished tracking session.
pub fn build_text_summary(run: &TrackedRun) -> TextSummary {
    let mut lines = Vec::new();

    if let Some(id) = run.run_id.as_ref() {
        lines.push(format!("Run: {id}"));
    }
    if let Some(err) = run.submission_error.as_deref() {
        lines.push(format!("Submission failed: {err}"));
        return TextSummary { lines };
    }

    let status = match run.outcome.as_ref() {
        Some(RunOutcome::Completed) => "Completed".to_string(),
        Some(RunOutcome::Errored { message: Some(m) }) => format!("Errored (backend): {m}"),
        Some(RunOutcome::Errored { message: None }) => "Errored (backend)".to_string(),
        Some(RunOutcome::QueryFailed { message }) => format!("Status query failed: {message}"),
        Some(RunOutcome::TimedOut { elapsed_ms, .. }) => format!(
            "Timed out after {}",
            humantime::format_duration(std::time::Duration::from_millis(*elapsed_ms))
        ),
        Some(RunOutcome::Cancelled { .. }) => "Cancelled".to_string(),
        None => "Submitted (not tracked)".to_string(),
    };
    lines.push(format!("Status: {status} ({} checks)", run.attempts));

    if let Some(best) = run
        .artifacts
        .get(&ArtifactKind::Best)
        .and_then(|c| c.as_text())
    {
        lines.push(format!("Best individual: {}", best.trim()));
    }

    if let Some(text) = run
        .artifacts
        .get(&ArtifactKind::Logbook)
        .and_then(|c| c.as_text())
    {
        let log = Logbook::parse(text);
        if !log.is_empty() {
            let fmt = |v: Option<f64>| v.map_or("-".to_string(), |v| format!("{v:.4}"));
            lines.push(format!(
                "Generations: {}  final avg {} min {} max {}",
                log.rows.len(),
                fmt(log.last_value("avg")),
                fmt(log.last_value("min")),
                fmt(log.last_value("max")),
            ));
            if let (Some((lowest, _)), Some((_, highest))) =
                (log.column_range("min"), log.column_range("max"))
            {
                lines.push(format!("Extremes over the run: min {lowest:.4} max {highest:.4}"));
            }
        }
    }

    if let Some(url) = run
        .artifacts
        .get(&ArtifactKind::FitnessPlot)
        .and_then(|c| c.as_reference())
    {
        lines.push(format!("Fitness plot: {url}"));
    }

    for (kind, err) in &run.artifact_failures {
        lines.push(format!("Unavailable {kind}: {err}"));
    }

    TextSummary { lines }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ArtifactContent, RunId};
    use std::collections::BTreeMap;

    fn tracked(outcome: Option<RunOutcome>) -> TrackedRun {
        TrackedRun {
            run_id: Some(RunId::new("r1")),
            started_at: String::new(),
            submission_error: None,
            last_record: None,
            attempts: 3,
            outcome,
            artifacts: BTreeMap::new(),
            artifact_failures: BTreeMap::new(),
        }
    }

    #[test]
    fn completed_run_lists_best_stats_and_plot() {
        let mut run = tracked(Some(RunOutcome::Completed));
        run.artifacts.insert(
            ArtifactKind::Best,
            ArtifactContent::Text("[1, 0, 1]\n".into()),
        );
        run.artifacts.insert(
            ArtifactKind::Logbook,
            ArtifactContent::Text("gen\tnevals\tavg\tmin\tmax\n0\t50\t0.5\t0.1\t0.9\n1\t40\t0.6\t0.2\t0.95\n".into()),
        );
        run.artifacts.insert(
            ArtifactKind::FitnessPlot,
            ArtifactContent::Reference("http://store/code/r1/fitness_plot.png".into()),
        );

        let lines = build_text_summary(&run).lines;

        assert_eq!(lines[0], "Run: r1");
        assert_eq!(lines[1], "Status: Completed (3 checks)");
        assert!(lines.contains(&"Best individual: [1, 0, 1]".to_string()));
        assert!(lines
            .iter()
            .any(|l| l == "Generations: 2  final avg 0.6000 min 0.2000 max 0.9500"));
        assert!(lines
            .iter()
            .any(|l| l == "Extremes over the run: min 0.1000 max 0.9500"));
        assert!(lines
            .iter()
            .any(|l| l.ends_with("/code/r1/fitness_plot.png")));
    }

    #[test]
    fn outcomes_read_differently() {
        let errored = build_text_summary(&tracked(Some(RunOutcome::Errored {
            message: Some("boom".into()),
        })));
        let failed = build_text_summary(&tracked(Some(RunOutcome::QueryFailed {
            message: "connection refused".into(),
        })));
        let timed_out = build_text_summary(&tracked(Some(RunOutcome::TimedOut {
            attempts: 3,
            elapsed_ms: 90_000,
        })));

        assert_eq!(errored.lines[1], "Status: Errored (backend): boom (3 checks)");
        assert_eq!(
            failed.lines[1],
            "Status: Status query failed: connection refused (3 checks)"
        );
        assert_eq!(timed_out.lines[1], "Status: Timed out after 1m 30s (3 checks)");
    }

    #[test]
    fn submission_failure_stops_early() {
        let mut run = tracked(None);
        run.run_id = None;
        run.submission_error = Some("backend rejected the run (422): bad weights".into());

        let lines = build_text_summary(&run).lines;
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("Submission failed:"));
    }
}
