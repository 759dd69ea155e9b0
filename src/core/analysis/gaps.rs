use std::sync::LazyLock;

use regex::Regex;

use crate::core::models::Index;
use crate::core::report::GapRow;

static TIME_GAP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([01]?[0-9]|2[0-3]):([0-5][0-9]):([0-5][0-9])$").expect("valid time gap pattern")
});

/// Parse an `hh:mm:ss` gap size into milliseconds. Zero is rejected.
pub fn parse_time_gap(value: &str) -> Result<i64, String> {
    let caps = TIME_GAP
        .captures(value.trim())
        .ok_or_else(|| format!("'{}' is not a valid hh:mm:ss time gap", value))?;

    let part = |i: usize| -> i64 { caps[i].parse().unwrap_or(0) };
    let millis = (part(1) * 3600 + part(2) * 60 + part(3)) * 1000;

    if millis == 0 {
        return Err("time gap must be greater than 00:00:00".to_string());
    }
    Ok(millis)
}

/// Distance from `from` to `to`: depth units, or milliseconds for
/// date-time indexes. Fails on a date-time value that cannot be parsed or
/// on mixed index kinds.
pub fn index_distance(from: &Index, to: &Index) -> Result<f64, String> {
    match (from, to) {
        (Index::Depth(a), Index::Depth(b)) => Ok(b - a),
        (Index::DateTime(_), Index::DateTime(_)) => {
            let millis = |index: &Index| {
                index
                    .as_epoch_millis()
                    .ok_or_else(|| format!("'{}' is not a valid date-time index", index))
            };
            Ok((millis(to)? - millis(from)?) as f64)
        }
        _ => Err(format!("cannot measure from {} to {}", from, to)),
    }
}

/// Gaps between consecutive samples of one mnemonic that exceed
/// `threshold`. `indexes` must be sorted ascending.
pub fn find_gaps(mnemonic: &str, indexes: &[&Index], threshold: f64) -> Result<Vec<GapRow>, String> {
    let mut gaps = Vec::new();
    for pair in indexes.windows(2) {
        let (current, next) = (pair[0], pair[1]);
        let size = index_distance(current, next)
            .map_err(|e| format!("mnemonic {}: {}", mnemonic, e))?;
        if size > threshold {
            gaps.push(GapRow {
                mnemonic: mnemonic.to_string(),
                gap_start: current.clone(),
                gap_end: next.clone(),
                size,
            });
        }
    }
    Ok(gaps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_time_gap() {
        assert_eq!(parse_time_gap("00:00:01"), Ok(1000));
        assert_eq!(parse_time_gap("01:00:00"), Ok(3_600_000));
        assert_eq!(parse_time_gap("23:59:59"), Ok(86_399_000));
        assert_eq!(parse_time_gap("1:30:00"), Ok(5_400_000));
    }

    #[test]
    fn test_parse_time_gap_rejects_invalid() {
        assert!(parse_time_gap("00:00:00").is_err());
        assert!(parse_time_gap("24:00:00").is_err());
        assert!(parse_time_gap("00:60:00").is_err());
        assert!(parse_time_gap("00:00:60").is_err());
        assert!(parse_time_gap("10:00").is_err());
        assert!(parse_time_gap("").is_err());
    }

    #[test]
    fn test_depth_gaps_above_threshold() {
        let indexes: Vec<Index> = [0.0, 10.0, 20.0, 50.0, 60.0, 100.0]
            .into_iter()
            .map(Index::Depth)
            .collect();
        let refs: Vec<&Index> = indexes.iter().collect();

        let gaps = find_gaps("GR", &refs, 10.0).unwrap();
        assert_eq!(gaps.len(), 2);
        assert_eq!(gaps[0].gap_start, Index::Depth(20.0));
        assert_eq!(gaps[0].gap_end, Index::Depth(50.0));
        assert_eq!(gaps[0].size, 30.0);
        assert_eq!(gaps[1].size, 40.0);
    }

    #[test]
    fn test_gap_equal_to_threshold_is_not_reported() {
        let indexes = [Index::Depth(0.0), Index::Depth(10.0)];
        let refs: Vec<&Index> = indexes.iter().collect();
        assert!(find_gaps("GR", &refs, 10.0).unwrap().is_empty());
    }

    #[test]
    fn test_fewer_than_two_samples_yield_no_gaps() {
        let single = [Index::Depth(5.0)];
        let refs: Vec<&Index> = single.iter().collect();
        assert!(find_gaps("GR", &refs, 1.0).unwrap().is_empty());
        assert!(find_gaps("GR", &[], 1.0).unwrap().is_empty());
    }

    #[test]
    fn test_time_gaps_in_milliseconds() {
        let indexes = [
            Index::DateTime("2024-01-01T00:00:00.000Z".into()),
            Index::DateTime("2024-01-01T00:00:30.000Z".into()),
            Index::DateTime("2024-01-01T00:05:30.000Z".into()),
        ];
        let refs: Vec<&Index> = indexes.iter().collect();

        let gaps = find_gaps("HKLD", &refs, 60_000.0).unwrap();
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].size, 300_000.0);
    }

    #[test]
    fn test_time_gaps_without_offset() {
        let indexes = [
            Index::DateTime("2024-01-01T00:00:00".into()),
            Index::DateTime("2024-01-01T00:01:00".into()),
            Index::DateTime("2024-01-01T01:00:00".into()),
        ];
        let refs: Vec<&Index> = indexes.iter().collect();

        let gaps = find_gaps("HKLD", &refs, 300_000.0).unwrap();
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].size, 3_540_000.0);
    }

    #[test]
    fn test_unparseable_time_index_is_an_error() {
        let indexes = [
            Index::DateTime("2024-01-01T00:00:00Z".into()),
            Index::DateTime("not a time".into()),
        ];
        let refs: Vec<&Index> = indexes.iter().collect();

        let err = find_gaps("HKLD", &refs, 1000.0).unwrap_err();
        assert!(err.contains("not a time"));
        assert!(err.starts_with("mnemonic HKLD"));
    }
}
