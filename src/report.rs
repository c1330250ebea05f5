//! Run summaries and report files.

use crate::model::{ScenarioReport, StepResult, SuiteReport};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde::Serialize;
use std::borrow::Cow;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Json,
    Yaml,
    Text,
    Junit,
    Html,
}

impl ReportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Text => "txt",
            Self::Junit => "xml",
            Self::Html => "html",
        }
    }
}

/// Aggregate counts over executed steps. Skipped steps are counted
/// separately and never in `total`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Percentage of `total`, 0 when nothing ran.
    pub pass_rate: f64,
    /// Mean over steps that got a response.
    pub avg_response_ms: f64,
}

impl Summary {
    pub fn of(report: &SuiteReport) -> Self {
        let results: Vec<&StepResult> = report.results().collect();
        let total = results.len();
        let passed = results.iter().filter(|r| r.passed).count();
        let answered: Vec<u64> = results
            .iter()
            .filter(|r| r.status.is_some())
            .map(|r| r.elapsed_ms)
            .collect();

        Self {
            total,
            passed,
            failed: total - passed,
            skipped: report.scenarios.iter().map(|s| s.skipped.len()).sum(),
            pass_rate: if total == 0 {
                0.0
            } else {
                passed as f64 * 100.0 / total as f64
            },
            avg_response_ms: if answered.is_empty() {
                0.0
            } else {
                answered.iter().sum::<u64>() as f64 / answered.len() as f64
            },
        }
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

#[derive(Serialize)]
struct Document<'a> {
    summary: Summary,
    #[serde(flatten)]
    report: &'a SuiteReport,
}

pub fn render(report: &SuiteReport, format: ReportFormat) -> Result<String> {
    let document = Document {
        summary: Summary::of(report),
        report,
    };
    Ok(match format {
        ReportFormat::Json => serde_json::to_string_pretty(&document)?,
        ReportFormat::Yaml => serde_yaml::to_string(&document)?,
        ReportFormat::Text => render_text(report),
        ReportFormat::Junit => render_junit(report)?,
        ReportFormat::Html => render_html(report)?,
    })
}

fn pass_fail(passed: bool) -> &'static str {
    if passed {
        "PASS"
    } else {
        "FAIL"
    }
}

pub fn render_text(report: &SuiteReport) -> String {
    let summary = Summary::of(report);
    let mut out = String::new();

    let _ = writeln!(out, "API test report ({})", report.started_at.to_rfc3339());
    let _ = writeln!(out, "Duration: {} ms\n", report.duration_ms);

    for scenario in &report.scenarios {
        let _ = writeln!(
            out,
            "Scenario: {} ({} ms)",
            scenario.name, scenario.duration_ms
        );
        for (i, result) in scenario.results.iter().enumerate() {
            let status = result
                .status
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string());
            let _ = writeln!(
                out,
                "  {}. {} {} {} -> {} ({})  {} ms",
                i + 1,
                result.step,
                result.method,
                result.path,
                status,
                pass_fail(result.passed),
                result.elapsed_ms
            );
            if let Some(reason) = &result.failure_reason {
                let _ = writeln!(out, "     Reason: {reason}");
            }
        }
        for name in &scenario.skipped {
            let _ = writeln!(out, "  - {name} (SKIPPED)");
        }
        out.push('\n');
    }

    let _ = writeln!(out, "Total: {}", summary.total);
    let _ = writeln!(out, "Passed: {}", summary.passed);
    let _ = writeln!(out, "Failed: {}", summary.failed);
    let _ = writeln!(out, "Skipped: {}", summary.skipped);
    let _ = writeln!(out, "Pass rate: {:.1}%", summary.pass_rate);
    let _ = writeln!(out, "Average response: {:.1} ms", summary.avg_response_ms);
    out
}

fn seconds(ms: u64) -> String {
    format!("{:.3}", ms as f64 / 1000.0)
}

type XmlWriter = Writer<Vec<u8>>;

/// Drop characters XML 1.0 cannot carry, even escaped.
fn xml_safe(text: &str) -> Cow<'_, str> {
    let legal = |c: char| {
        matches!(c, '\t' | '\n' | '\r')
            || ('\u{20}'..='\u{D7FF}').contains(&c)
            || ('\u{E000}'..='\u{FFFD}').contains(&c)
            || c >= '\u{10000}'
    };
    if text.chars().all(legal) {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(text.chars().filter(|c| legal(*c)).collect())
    }
}

fn element(name: &str, attrs: &[(&str, &str)]) -> BytesStart<'static> {
    let mut start = BytesStart::new(name.to_string());
    for (key, value) in attrs {
        start.push_attribute((*key, xml_safe(value).as_ref()));
    }
    start
}

fn open(w: &mut XmlWriter, name: &str, attrs: &[(&str, &str)]) -> Result<()> {
    w.write_event(Event::Start(element(name, attrs)))?;
    Ok(())
}

fn close(w: &mut XmlWriter, name: &str) -> Result<()> {
    w.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn empty(w: &mut XmlWriter, name: &str, attrs: &[(&str, &str)]) -> Result<()> {
    w.write_event(Event::Empty(element(name, attrs)))?;
    Ok(())
}

fn text_element(
    w: &mut XmlWriter,
    name: &str,
    attrs: &[(&str, &str)],
    text: &str,
) -> Result<()> {
    open(w, name, attrs)?;
    w.write_event(Event::Text(BytesText::new(&xml_safe(text))))?;
    close(w, name)
}

fn finish(w: XmlWriter) -> Result<String> {
    let mut out = String::from_utf8(w.into_inner())?;
    out.push('\n');
    Ok(out)
}

// ── junit ───────────────────────────────────────────────

fn junit_suite(w: &mut XmlWriter, scenario: &ScenarioReport) -> Result<()> {
    let failures = scenario.results.iter().filter(|r| !r.passed).count();
    let tests = (scenario.results.len() + scenario.skipped.len()).to_string();
    open(
        w,
        "testsuite",
        &[
            ("name", scenario.name.as_str()),
            ("tests", tests.as_str()),
            ("failures", failures.to_string().as_str()),
            ("skipped", scenario.skipped.len().to_string().as_str()),
            ("time", seconds(scenario.duration_ms).as_str()),
        ],
    )?;

    for result in &scenario.results {
        let time = seconds(result.elapsed_ms);
        let attrs = [
            ("name", result.step.as_str()),
            ("classname", scenario.name.as_str()),
            ("time", time.as_str()),
        ];
        if result.passed {
            empty(w, "testcase", &attrs)?;
            continue;
        }
        let kind = if result.transport_error {
            "transport"
        } else {
            "validation"
        };
        open(w, "testcase", &attrs)?;
        empty(
            w,
            "failure",
            &[
                ("type", kind),
                ("message", result.failure_reason.as_deref().unwrap_or("failed")),
            ],
        )?;
        close(w, "testcase")?;
    }

    for skipped in &scenario.skipped {
        open(
            w,
            "testcase",
            &[("name", skipped.as_str()), ("classname", scenario.name.as_str())],
        )?;
        empty(w, "skipped", &[])?;
        close(w, "testcase")?;
    }

    close(w, "testsuite")
}

pub fn render_junit(report: &SuiteReport) -> Result<String> {
    let summary = Summary::of(report);
    let mut w = Writer::new_with_indent(Vec::new(), b' ', 2);
    w.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    open(
        &mut w,
        "testsuites",
        &[
            ("name", "api-tester"),
            ("tests", (summary.total + summary.skipped).to_string().as_str()),
            ("failures", summary.failed.to_string().as_str()),
            ("skipped", summary.skipped.to_string().as_str()),
            ("time", seconds(report.duration_ms).as_str()),
        ],
    )?;
    for scenario in &report.scenarios {
        junit_suite(&mut w, scenario)?;
    }
    close(&mut w, "testsuites")?;
    finish(w)
}

// ── html ────────────────────────────────────────────────

const HTML_STYLE: &str = "
body { font-family: sans-serif; color: #333; max-width: 1200px; margin: 0 auto; padding: 20px; }
table { border-collapse: collapse; margin-bottom: 24px; width: 100%; }
th, td { border: 1px solid #ddd; padding: 6px 10px; text-align: left; }
th { background: #f8f9fa; }
table.summary { width: auto; }
tr.passed { background: #d4edda; }
tr.failed { background: #f8d7da; }
tr.skipped { background: #e2e3e5; color: #666; }
";

const HTML_COLUMNS: [&str; 9] = [
    "#", "Step", "Method", "Path", "Status", "Expected", "Result", "Time (ms)",
    "Reason",
];

fn html_row(w: &mut XmlWriter, class: &str, cells: &[&str]) -> Result<()> {
    open(w, "tr", &[("class", class)])?;
    for cell in cells {
        text_element(w, "td", &[], cell)?;
    }
    close(w, "tr")
}

fn html_scenario(w: &mut XmlWriter, scenario: &ScenarioReport) -> Result<()> {
    text_element(
        w,
        "h2",
        &[],
        &format!("{} ({} ms)", scenario.name, scenario.duration_ms),
    )?;
    if let Some(description) = &scenario.description {
        text_element(w, "p", &[], description)?;
    }

    open(w, "table", &[("class", "steps")])?;
    open(w, "thead", &[])?;
    open(w, "tr", &[])?;
    for column in HTML_COLUMNS {
        text_element(w, "th", &[], column)?;
    }
    close(w, "tr")?;
    close(w, "thead")?;

    open(w, "tbody", &[])?;
    for (i, result) in scenario.results.iter().enumerate() {
        let class = if result.passed { "passed" } else { "failed" };
        let status = result
            .status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        html_row(
            w,
            class,
            &[
                (i + 1).to_string().as_str(),
                result.step.as_str(),
                result.method.as_str(),
                result.path.as_str(),
                status.as_str(),
                result.expected_status.as_deref().unwrap_or("-"),
                pass_fail(result.passed),
                result.elapsed_ms.to_string().as_str(),
                result.failure_reason.as_deref().unwrap_or(""),
            ],
        )?;
    }
    for name in &scenario.skipped {
        html_row(
            w,
            "skipped",
            &[
                "-",
                name.as_str(),
                "",
                "",
                "",
                "",
                "SKIPPED",
                "",
                "dependencies not completed",
            ],
        )?;
    }
    close(w, "tbody")?;
    close(w, "table")
}

/// Standalone HTML page: summary table, then one step table per
/// scenario.
pub fn render_html(report: &SuiteReport) -> Result<String> {
    let summary = Summary::of(report);
    let mut w = Writer::new_with_indent(Vec::new(), b' ', 2);
    w.write_event(Event::DocType(BytesText::from_escaped("html")))?;

    open(&mut w, "html", &[("lang", "en")])?;
    open(&mut w, "head", &[])?;
    empty(&mut w, "meta", &[("charset", "UTF-8")])?;
    text_element(&mut w, "title", &[], "API test report")?;
    open(&mut w, "style", &[])?;
    w.write_event(Event::Text(BytesText::from_escaped(HTML_STYLE)))?;
    close(&mut w, "style")?;
    close(&mut w, "head")?;

    open(&mut w, "body", &[])?;
    text_element(&mut w, "h1", &[], "API test report")?;
    text_element(
        &mut w,
        "p",
        &[],
        &format!(
            "Started {}, {} ms",
            report.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
            report.duration_ms
        ),
    )?;

    open(&mut w, "table", &[("class", "summary")])?;
    for (label, value) in [
        ("Total", summary.total.to_string()),
        ("Passed", summary.passed.to_string()),
        ("Failed", summary.failed.to_string()),
        ("Skipped", summary.skipped.to_string()),
        ("Pass rate", format!("{:.1}%", summary.pass_rate)),
        ("Average response", format!("{:.1} ms", summary.avg_response_ms)),
    ] {
        open(&mut w, "tr", &[])?;
        text_element(&mut w, "th", &[], label)?;
        text_element(&mut w, "td", &[], &value)?;
        close(&mut w, "tr")?;
    }
    close(&mut w, "table")?;

    for scenario in &report.scenarios {
        html_scenario(&mut w, scenario)?;
    }

    close(&mut w, "body")?;
    close(&mut w, "html")?;
    finish(w)
}

/// `api-test-report-<date>-<time>-<millis>.<ext>`.
pub fn report_file_name(format: ReportFormat, at: DateTime<Utc>) -> String {
    format!(
        "api-test-report-{}.{}",
        at.format("%Y%m%d-%H%M%S-%3f"),
        format.extension()
    )
}

/// Write the report into `dir`, creating it if needed.
pub fn save_report(
    report: &SuiteReport,
    dir: &Path,
    format: ReportFormat,
) -> Result<PathBuf> {
    if !dir.exists() {
        fs::create_dir_all(dir).context(format!(
            "Failed to create report directory: {}",
            dir.display()
        ))?;
    }

    let content = render(report, format)?;
    let file_path = dir.join(report_file_name(format, Utc::now()));
    fs::write(&file_path, content).context(format!(
        "Failed to write report: {}",
        file_path.display()
    ))?;

    Ok(file_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::HttpMethod;
    use chrono::TimeZone;
    use quick_xml::Reader;

    fn result(step: &str, status: Option<u16>, passed: bool, ms: u64) -> StepResult {
        StepResult {
            scenario: "checkout".into(),
            step: step.into(),
            method: HttpMethod::Get,
            path: format!("/{step}"),
            status,
            expected_status: Some("2xx".into()),
            passed,
            failure_reason: (!passed).then(|| format!("{step} <broke> & more")),
            transport_error: status.is_none(),
            elapsed_ms: ms,
            response_body: None,
            tested_at: Utc::now(),
        }
    }

    fn report() -> SuiteReport {
        SuiteReport {
            scenarios: vec![ScenarioReport {
                name: "checkout".into(),
                description: None,
                results: vec![
                    result("cart", Some(200), true, 10),
                    result("pay", Some(500), false, 30),
                    result("ship", None, false, 0),
                ],
                skipped: vec!["notify".into()],
                duration_ms: 45,
            }],
            duration_ms: 50,
            started_at: Utc::now(),
        }
    }

    // ── summary ─────────────────────────────────────────

    #[test]
    fn test_summary_counts() {
        let summary = Summary::of(&report());
        assert_eq!(summary.total, 3);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.skipped, 1);
        assert!((summary.pass_rate - 100.0 / 3.0).abs() < 1e-9);
        assert_eq!(summary.avg_response_ms, 20.0);
        assert!(!summary.all_passed());
    }

    #[test]
    fn test_empty_summary() {
        let empty = SuiteReport {
            scenarios: vec![],
            duration_ms: 0,
            started_at: Utc::now(),
        };
        let summary = Summary::of(&empty);
        assert_eq!(summary.pass_rate, 0.0);
        assert!(summary.all_passed());
    }

    // ── renderers ───────────────────────────────────────

    #[test]
    fn test_json_has_summary_and_scenarios() {
        let json: serde_json::Value =
            serde_json::from_str(&render(&report(), ReportFormat::Json).unwrap())
                .unwrap();
        assert_eq!(json["summary"]["failed"], 2);
        assert_eq!(json["scenarios"][0]["results"][1]["status"], 500);
        assert_eq!(json["scenarios"][0]["skipped"][0], "notify");
    }

    #[test]
    fn test_text_lists_steps() {
        let text = render_text(&report());
        assert!(text.contains("2. pay GET /pay -> 500 (FAIL)"));
        assert!(text.contains("3. ship GET /ship -> - (FAIL)"));
        assert!(text.contains("notify (SKIPPED)"));
        assert!(text.contains("Pass rate: 33.3%"));
    }

    fn failure_messages(xml: &str) -> Vec<String> {
        let mut reader = Reader::from_str(xml);
        let mut messages = Vec::new();
        loop {
            match reader.read_event().unwrap() {
                Event::Empty(e) | Event::Start(e)
                    if e.name().as_ref() == b"failure" =>
                {
                    let attr = e.try_get_attribute("message").unwrap().unwrap();
                    messages.push(attr.unescape_value().unwrap().into_owned());
                }
                Event::Eof => break,
                _ => {}
            }
        }
        messages
    }

    #[test]
    fn test_junit_escapes_and_marks_failures() {
        let xml = render_junit(&report()).unwrap();
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains(
            "<testsuite name=\"checkout\" tests=\"4\" failures=\"2\" skipped=\"1\""
        ));
        assert!(xml.contains("message=\"pay &lt;broke&gt; &amp; more\""));
        assert!(xml.contains("<failure type=\"transport\""));
        assert!(xml.contains("<skipped/>"));
        assert!(!xml.contains("<broke>"));

        assert_eq!(
            failure_messages(&xml),
            vec!["pay <broke> & more", "ship <broke> & more"]
        );
    }

    #[test]
    fn test_junit_drops_control_characters() {
        let mut report = report();
        report.scenarios[0].results[1].step = "pay\u{8}now".into();
        report.scenarios[0].results[1].failure_reason = Some("bell\u{7}".into());

        let xml = render_junit(&report).unwrap();
        assert!(!xml.contains('\u{8}'));
        assert!(!xml.contains('\u{7}'));
        assert!(xml.contains("name=\"paynow\""));
        assert_eq!(failure_messages(&xml)[0], "bell");
    }

    #[test]
    fn test_html_has_summary_and_step_rows() {
        let html = render(&report(), ReportFormat::Html).unwrap();
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<td>33.3%</td>"));
        assert!(html.contains("<td>20.0 ms</td>"));
        assert!(html.contains("<tr class=\"failed\">"));
        assert!(html.contains("<tr class=\"skipped\">"));
        assert!(html.contains("<td>/pay</td>"));
        assert!(html.contains("<td>pay &lt;broke&gt; &amp; more</td>"));
        assert!(html.contains("<td>notify</td>"));
        assert!(!html.contains("<broke>"));
    }

    // ── files ───────────────────────────────────────────

    #[test]
    fn test_file_name() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap()
            + chrono::Duration::milliseconds(42);
        assert_eq!(
            report_file_name(ReportFormat::Junit, at),
            "api-test-report-20240309-070501-042.xml"
        );
        assert!(report_file_name(ReportFormat::Html, at).ends_with(".html"));
    }

    #[test]
    fn test_save_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested/reports");
        let path = save_report(&report(), &target, ReportFormat::Yaml).unwrap();
        assert!(path.starts_with(&target));
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("summary:"));
    }
}
