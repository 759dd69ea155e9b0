//! Structured job reports and their flat tabular export.

use serde::{Deserialize, Serialize};

use super::models::{Index, IndexType};

/// Rendered in place of an index value that is missing on one side.
pub const MISSING_VALUE: &str = "-";

/// Output of a terminal job. Never mutated after it is attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub title: String,
    pub summary: ReportSummary,
    pub rows: ReportRows,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ReportSummary {
    #[serde(rename_all = "camelCase")]
    Comparison {
        index_types_match: bool,
        source_index_type: IndexType,
        target_index_type: IndexType,
        source_curves: usize,
        target_curves: usize,
        mismatches: usize,
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    Gaps {
        mnemonics_analyzed: usize,
        gaps: usize,
        message: String,
    },
}

impl ReportSummary {
    pub fn message(&self) -> &str {
        match self {
            Self::Comparison { message, .. } | Self::Gaps { message, .. } => message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "entries", rename_all = "camelCase")]
pub enum ReportRows {
    Comparison(Vec<ComparisonRow>),
    Gaps(Vec<GapRow>),
}

impl ReportRows {
    pub fn len(&self) -> usize {
        match self {
            Self::Comparison(rows) => rows.len(),
            Self::Gaps(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Character positions that differ between the source and target renderings
/// of one index value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffMarks {
    pub source: Vec<usize>,
    pub target: Vec<usize>,
}

impl DiffMarks {
    pub fn is_empty(&self) -> bool {
        self.source.is_empty() && self.target.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonRow {
    pub mnemonic: String,
    pub source_start: Option<Index>,
    pub source_end: Option<Index>,
    pub target_start: Option<Index>,
    pub target_end: Option<Index>,
    pub start_marks: DiffMarks,
    pub end_marks: DiffMarks,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GapRow {
    pub mnemonic: String,
    pub gap_start: Index,
    pub gap_end: Index,
    /// Depth units for depth logs, milliseconds for time logs.
    pub size: f64,
}

impl Report {
    pub fn comparison(title: String, summary: ReportSummary, rows: Vec<ComparisonRow>) -> Self {
        Self {
            title,
            summary,
            rows: ReportRows::Comparison(rows),
        }
    }

    pub fn gaps(title: String, summary: ReportSummary, rows: Vec<GapRow>) -> Self {
        Self {
            title,
            summary,
            rows: ReportRows::Gaps(rows),
        }
    }

    /// Flat CSV export, one line per row plus a header line.
    pub fn to_csv(&self) -> String {
        let mut out = String::new();

        match &self.rows {
            ReportRows::Comparison(rows) => {
                push_record(
                    &mut out,
                    &["Curve mnemonic", "Source start", "Target start", "Source end", "Target end"],
                );
                for row in rows {
                    push_record(
                        &mut out,
                        &[
                            &row.mnemonic,
                            &render(&row.source_start),
                            &render(&row.target_start),
                            &render(&row.source_end),
                            &render(&row.target_end),
                        ],
                    );
                }
            }
            ReportRows::Gaps(rows) => {
                push_record(&mut out, &["Mnemonic", "Gap start", "Gap end", "Gap size"]);
                for row in rows {
                    push_record(
                        &mut out,
                        &[
                            &row.mnemonic,
                            &row.gap_start.to_string(),
                            &row.gap_end.to_string(),
                            &row.size.to_string(),
                        ],
                    );
                }
            }
        }

        out
    }
}

/// Display form of an optional index value.
pub fn render(value: &Option<Index>) -> String {
    match value {
        Some(index) => index.to_string(),
        None => MISSING_VALUE.to_string(),
    }
}

fn push_record(out: &mut String, fields: &[&str]) {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        if field.contains([',', '"', '\n', '\r']) {
            out.push('"');
            out.push_str(&field.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(field);
        }
    }
    out.push_str("\r\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gap_summary() -> ReportSummary {
        ReportSummary::Gaps {
            mnemonics_analyzed: 1,
            gaps: 1,
            message: "1 gap found".into(),
        }
    }

    #[test]
    fn test_gap_csv_export() {
        let report = Report::gaps(
            "Analyze gaps".into(),
            gap_summary(),
            vec![GapRow {
                mnemonic: "GR".into(),
                gap_start: Index::Depth(10.0),
                gap_end: Index::Depth(25.5),
                size: 15.5,
            }],
        );

        assert_eq!(
            report.to_csv(),
            "Mnemonic,Gap start,Gap end,Gap size\r\nGR,10,25.5,15.5\r\n"
        );
    }

    #[test]
    fn test_comparison_csv_renders_missing_and_quotes() {
        let summary = ReportSummary::Comparison {
            index_types_match: true,
            source_index_type: IndexType::MeasuredDepth,
            target_index_type: IndexType::MeasuredDepth,
            source_curves: 1,
            target_curves: 0,
            mismatches: 1,
            message: String::new(),
        };
        let report = Report::comparison(
            "Log comparison".into(),
            summary,
            vec![ComparisonRow {
                mnemonic: "A,B".into(),
                source_start: Some(Index::Depth(0.0)),
                source_end: Some(Index::Depth(5.0)),
                target_start: None,
                target_end: None,
                start_marks: DiffMarks::default(),
                end_marks: DiffMarks::default(),
            }],
        );

        let csv = report.to_csv();
        let lines: Vec<&str> = csv.split("\r\n").collect();
        assert_eq!(lines[1], "\"A,B\",0,-,5,-");
    }

    #[test]
    fn test_report_serializes_with_kind_tags() {
        let report = Report::gaps("Analyze gaps".into(), gap_summary(), vec![]);
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["rows"]["kind"], "gaps");
        assert_eq!(json["summary"]["kind"], "gaps");
        assert_eq!(json["summary"]["mnemonicsAnalyzed"], 1);
    }
}
