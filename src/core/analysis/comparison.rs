//! Curve-by-curve comparison of two logs' index ranges.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Local, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::core::models::{Index, IndexType, LogCurveInfo};
use crate::core::report::{ComparisonRow, DiffMarks};

/// How date-time index values are rendered before they are compared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeZoneSetting {
    /// Values as returned by the server.
    #[default]
    Raw,
    Utc,
    Local,
}

impl TimeZoneSetting {
    /// Render a date-time literal. Values that are not RFC 3339 are kept
    /// verbatim.
    pub fn format(&self, value: &str) -> String {
        if *self == Self::Raw {
            return value.to_string();
        }
        let Ok(parsed) = DateTime::parse_from_rfc3339(value) else {
            return value.to_string();
        };

        match self {
            Self::Utc => parsed
                .with_timezone(&Utc)
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            Self::Local => parsed
                .with_timezone(&Local)
                .to_rfc3339_opts(SecondsFormat::Millis, false),
            Self::Raw => value.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub index_types_match: bool,
    pub source_type: IndexType,
    pub target_type: IndexType,
    pub rows: Vec<ComparisonRow>,
}

/// A log is time indexed if its first curve starts at a date-time.
pub fn index_type_of(curves: &[LogCurveInfo]) -> IndexType {
    if curves.first().is_some_and(LogCurveInfo::index_is_date_time) {
        IndexType::DateTime
    } else {
        IndexType::MeasuredDepth
    }
}

pub fn compare_curves(
    source: &[LogCurveInfo],
    target: &[LogCurveInfo],
    time_zone: TimeZoneSetting,
) -> Comparison {
    let source_type = index_type_of(source);
    let target_type = index_type_of(target);

    if source_type != target_type {
        return Comparison {
            index_types_match: false,
            source_type,
            target_type,
            rows: Vec::new(),
        };
    }

    let normalize = |index: &Option<Index>| -> Option<Index> {
        match index {
            Some(Index::DateTime(value)) => Some(Index::DateTime(time_zone.format(value))),
            other => other.clone(),
        }
    };
    let ranges = |curves: &[LogCurveInfo]| -> HashMap<String, (Option<Index>, Option<Index>)> {
        curves
            .iter()
            .map(|c| {
                (
                    c.mnemonic.clone(),
                    (normalize(&c.min_index), normalize(&c.max_index)),
                )
            })
            .collect()
    };
    let source_ranges = ranges(source);
    let target_ranges = ranges(target);

    let mut seen = HashSet::new();
    let mut rows = Vec::new();

    for curve in source.iter().chain(target) {
        if !seen.insert(curve.mnemonic.as_str()) {
            continue;
        }

        let source_range = source_ranges.get(&curve.mnemonic);
        let target_range = target_ranges.get(&curve.mnemonic);

        if source_range.is_some() && source_range == target_range {
            continue;
        }

        let (source_start, source_end) = source_range.cloned().unwrap_or((None, None));
        let (target_start, target_end) = target_range.cloned().unwrap_or((None, None));

        rows.push(ComparisonRow {
            mnemonic: curve.mnemonic.clone(),
            start_marks: mark_differences(&source_start, &target_start),
            end_marks: mark_differences(&source_end, &target_end),
            source_start,
            source_end,
            target_start,
            target_end,
        });
    }

    Comparison {
        index_types_match: true,
        source_type,
        target_type,
        rows,
    }
}

/// Character positions that differ between the displayed source and
/// target values.
pub fn mark_differences(source: &Option<Index>, target: &Option<Index>) -> DiffMarks {
    match (source, target) {
        (None, None) => DiffMarks::default(),
        (Some(s), None) => DiffMarks {
            source: (0..s.to_string().chars().count()).collect(),
            target: Vec::new(),
        },
        (None, Some(t)) => DiffMarks {
            source: Vec::new(),
            target: (0..t.to_string().chars().count()).collect(),
        },
        (Some(Index::Depth(s)), Some(Index::Depth(t))) => {
            mark_number_differences(&s.to_string(), &t.to_string())
        }
        (Some(s), Some(t)) => mark_positional(&s.to_string(), &t.to_string(), 0, 0),
    }
}

/// Numbers are compared digit by digit with their decimal points aligned.
fn mark_number_differences(source: &str, target: &str) -> DiffMarks {
    let integer_len = |s: &str| s.find('.').unwrap_or(s.len());
    let (s_int, t_int) = (integer_len(source), integer_len(target));
    let width = s_int.max(t_int);

    mark_positional(source, target, width - s_int, width - t_int)
}

/// Compare two strings placed at column offsets `s_shift` and `t_shift`.
fn mark_positional(source: &str, target: &str, s_shift: usize, t_shift: usize) -> DiffMarks {
    let s: Vec<char> = source.chars().collect();
    let t: Vec<char> = target.chars().collect();

    DiffMarks {
        source: differing(&s, s_shift, &t, t_shift),
        target: differing(&t, t_shift, &s, s_shift),
    }
}

fn differing(own: &[char], own_shift: usize, other: &[char], other_shift: usize) -> Vec<usize> {
    own.iter()
        .enumerate()
        .filter(|(i, c)| {
            let other_char = (i + own_shift)
                .checked_sub(other_shift)
                .and_then(|j| other.get(j));
            other_char != Some(*c)
        })
        .map(|(i, _)| i)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn depth(mnemonic: &str, min: f64, max: f64) -> LogCurveInfo {
        LogCurveInfo::depth(mnemonic, min, max)
    }

    #[test]
    fn test_identical_logs_produce_no_rows() {
        let source = vec![depth("DEPT", 0.0, 1000.0)];
        let target = vec![depth("DEPT", 0.0, 1000.0)];

        let result = compare_curves(&source, &target, TimeZoneSetting::Raw);
        assert!(result.index_types_match);
        assert!(result.rows.is_empty());
    }

    #[test]
    fn test_end_mismatch_produces_row() {
        let source = vec![depth("GR", 0.0, 500.0)];
        let target = vec![depth("GR", 0.0, 400.0)];

        let result = compare_curves(&source, &target, TimeZoneSetting::Raw);
        assert_eq!(result.rows.len(), 1);

        let row = &result.rows[0];
        assert_eq!(row.mnemonic, "GR");
        assert_eq!(row.source_end, Some(Index::Depth(500.0)));
        assert_eq!(row.target_end, Some(Index::Depth(400.0)));
        assert!(row.start_marks.is_empty());
        assert_eq!(row.end_marks.source, vec![0]);
        assert_eq!(row.end_marks.target, vec![0]);
    }

    #[test]
    fn test_one_sided_mnemonics_are_reported_in_order() {
        let source = vec![depth("DEPT", 0.0, 10.0), depth("GR", 0.0, 5.0)];
        let target = vec![depth("RHOB", 1.0, 9.0), depth("DEPT", 0.0, 10.0)];

        let result = compare_curves(&source, &target, TimeZoneSetting::Raw);
        let names: Vec<&str> = result.rows.iter().map(|r| r.mnemonic.as_str()).collect();
        assert_eq!(names, vec!["GR", "RHOB"]);

        let gr = &result.rows[0];
        assert_eq!(gr.target_start, None);
        assert_eq!(gr.start_marks.source, vec![0]);
        assert!(gr.start_marks.target.is_empty());
    }

    #[test]
    fn test_mnemonics_are_case_sensitive() {
        let source = vec![depth("gr", 0.0, 5.0)];
        let target = vec![depth("GR", 0.0, 5.0)];
        assert_eq!(
            compare_curves(&source, &target, TimeZoneSetting::Raw).rows.len(),
            2
        );
    }

    #[test]
    fn test_comparison_is_symmetric() {
        let a = vec![depth("GR", 0.0, 500.0), depth("DEPT", 0.0, 10.0)];
        let b = vec![depth("GR", 0.0, 400.0), depth("RHOB", 0.0, 10.0)];

        let forward = compare_curves(&a, &b, TimeZoneSetting::Raw);
        let backward = compare_curves(&b, &a, TimeZoneSetting::Raw);

        let mut f: Vec<&str> = forward.rows.iter().map(|r| r.mnemonic.as_str()).collect();
        let mut g: Vec<&str> = backward.rows.iter().map(|r| r.mnemonic.as_str()).collect();
        f.sort();
        g.sort();
        assert_eq!(f, g);

        let gr = backward.rows.iter().find(|r| r.mnemonic == "GR").unwrap();
        assert_eq!(gr.source_end, Some(Index::Depth(400.0)));
        assert_eq!(gr.target_end, Some(Index::Depth(500.0)));
    }

    #[test]
    fn test_index_type_mismatch_yields_no_rows() {
        let source = vec![depth("DEPT", 0.0, 10.0)];
        let target = vec![LogCurveInfo::time(
            "TIME",
            "2024-01-01T00:00:00Z",
            "2024-01-01T01:00:00Z",
        )];

        let result = compare_curves(&source, &target, TimeZoneSetting::Raw);
        assert!(!result.index_types_match);
        assert_eq!(result.source_type, IndexType::MeasuredDepth);
        assert_eq!(result.target_type, IndexType::DateTime);
        assert!(result.rows.is_empty());
    }

    #[test]
    fn test_time_values_compare_as_strings() {
        let source = vec![LogCurveInfo::time(
            "TIME",
            "2024-01-01T00:00:00Z",
            "2024-01-01T01:00:00Z",
        )];
        let target = vec![LogCurveInfo::time(
            "TIME",
            "2024-01-01T01:00:00+01:00",
            "2024-01-01T01:00:00Z",
        )];

        let raw = compare_curves(&source, &target, TimeZoneSetting::Raw);
        assert_eq!(raw.rows.len(), 1);
        assert!(!raw.rows[0].start_marks.is_empty());
        assert!(raw.rows[0].end_marks.is_empty());

        let utc = compare_curves(&source, &target, TimeZoneSetting::Utc);
        assert!(utc.rows.is_empty());
    }

    #[test]
    fn test_numbers_align_on_decimal_point() {
        let marks = mark_differences(&Some(Index::Depth(1000.5)), &Some(Index::Depth(999.5)));
        assert_eq!(marks.source, vec![0, 1, 2, 3]);
        assert_eq!(marks.target, vec![0, 1, 2]);

        let marks = mark_differences(&Some(Index::Depth(12.25)), &Some(Index::Depth(12.5)));
        assert_eq!(marks.source, vec![3, 4]);
        assert_eq!(marks.target, vec![3]);
    }

    #[test]
    fn test_utc_formatting() {
        assert_eq!(
            TimeZoneSetting::Utc.format("2024-01-01T01:00:00+01:00"),
            "2024-01-01T00:00:00.000Z"
        );
        assert_eq!(TimeZoneSetting::Utc.format("not a date"), "not a date");
        assert_eq!(TimeZoneSetting::Raw.format("2024-01-01T01:00:00+01:00"), "2024-01-01T01:00:00+01:00");
    }
}
