//! Waypoint list parser
//!
//! Coordinate lists arrive as delimited text:
//! ```text
//! lat,lon;lat,lon;...
//! ```
//! Parsing is best-effort. Entries that do not split into exactly two fields
//! are dropped. What happens to an entry with an unparsable field is decided
//! by [`FieldFailurePolicy`].

use crate::Waypoint;
use serde::Deserialize;
use tracing::warn;

const ENTRY_SEPARATOR: char = ';';
const FIELD_SEPARATOR: char = ',';

/// What to do with an entry whose latitude or longitude fails to parse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum FieldFailurePolicy {
    /// Keep the waypoint with 0.0 in the failed field
    #[default]
    #[serde(rename = "keep", alias = "keep_degraded")]
    KeepDegraded,
    /// Drop the whole entry
    #[serde(rename = "drop", alias = "drop_entry")]
    DropEntry,
}

/// Parse a coordinate list into waypoints, preserving input order
pub fn parse_waypoints(data: &str, policy: FieldFailurePolicy) -> Vec<Waypoint> {
    data.split(ENTRY_SEPARATOR)
        .filter_map(|entry| parse_entry(entry, policy))
        .collect()
}

fn parse_entry(entry: &str, policy: FieldFailurePolicy) -> Option<Waypoint> {
    let mut fields = entry.split(FIELD_SEPARATOR);
    let (lat, lon) = match (fields.next(), fields.next(), fields.next()) {
        (Some(lat), Some(lon), None) => (lat, lon),
        _ => return None,
    };

    let latitude = parse_field(lat, "latitude");
    let longitude = parse_field(lon, "longitude");

    match (latitude, longitude, policy) {
        (Some(latitude), Some(longitude), _) => Some(Waypoint::new(latitude, longitude)),
        (_, _, FieldFailurePolicy::DropEntry) => None,
        (latitude, longitude, FieldFailurePolicy::KeepDegraded) => Some(Waypoint::new(
            latitude.unwrap_or_default(),
            longitude.unwrap_or_default(),
        )),
    }
}

fn parse_field(field: &str, name: &str) -> Option<f64> {
    match field.parse::<f64>() {
        Ok(value) if value.is_finite() => Some(value),
        // "nan", "inf" and "infinity" parse, but have no JSON encoding
        Ok(value) => {
            warn!("waypoint {} {:?} is not finite: {}", name, field, value);
            None
        }
        Err(e) => {
            warn!("failed to parse waypoint {} {:?}: {}", name, field, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keep(data: &str) -> Vec<Waypoint> {
        parse_waypoints(data, FieldFailurePolicy::KeepDegraded)
    }

    #[test]
    fn test_two_waypoints() {
        let wps = keep("56.348284,43.959410;56.359226,43.907618");
        assert_eq!(wps.len(), 2);
        assert_eq!(wps[0], Waypoint::new(56.348284, 43.959410));
        assert_eq!(wps[1], Waypoint::new(56.359226, 43.907618));
    }

    #[test]
    fn test_bad_entry_dropped_without_affecting_neighbours() {
        let wps = keep("1,2;bad;3,4");
        assert_eq!(wps, vec![Waypoint::new(1.0, 2.0), Waypoint::new(3.0, 4.0)]);

        let wps = keep("1,2;5,6,7;3,4");
        assert_eq!(wps, vec![Waypoint::new(1.0, 2.0), Waypoint::new(3.0, 4.0)]);
    }

    #[test]
    fn test_empty_input() {
        assert!(keep("").is_empty());
        assert!(keep(";;;").is_empty());
        assert!(keep("garbage").is_empty());
    }

    #[test]
    fn test_trailing_and_leading_separators() {
        let wps = keep(";10.5,-20.25;");
        assert_eq!(wps, vec![Waypoint::new(10.5, -20.25)]);
    }

    #[test]
    fn test_order_preserved() {
        let data = (0..10)
            .map(|i| format!("{}.5,{}.25", i, i + 100))
            .collect::<Vec<_>>()
            .join(";");
        let wps = keep(&data);
        assert_eq!(wps.len(), 10);
        for (i, wp) in wps.iter().enumerate() {
            assert_eq!(wp.latitude, i as f64 + 0.5);
            assert_eq!(wp.longitude, i as f64 + 100.25);
        }
    }

    #[test]
    fn test_keep_degraded_field() {
        let wps = keep("abc,43.9;56.3,xyz");
        assert_eq!(
            wps,
            vec![Waypoint::new(0.0, 43.9), Waypoint::new(56.3, 0.0)]
        );
    }

    #[test]
    fn test_drop_entry_policy() {
        let wps = parse_waypoints("abc,43.9;1,2;56.3,", FieldFailurePolicy::DropEntry);
        assert_eq!(wps, vec![Waypoint::new(1.0, 2.0)]);
    }

    #[test]
    fn test_non_finite_field_is_a_field_failure() {
        assert_eq!(keep("nan,1"), vec![Waypoint::new(0.0, 1.0)]);
        assert_eq!(keep("1,inf"), vec![Waypoint::new(1.0, 0.0)]);
        assert_eq!(keep("-infinity,NaN"), vec![Waypoint::new(0.0, 0.0)]);

        let wps = parse_waypoints("nan,1;1,inf;2,3", FieldFailurePolicy::DropEntry);
        assert_eq!(wps, vec![Waypoint::new(2.0, 3.0)]);
    }

    #[test]
    fn test_whitespace_not_tolerated() {
        let wps = parse_waypoints("1, 2", FieldFailurePolicy::DropEntry);
        assert!(wps.is_empty());
    }

    #[test]
    fn test_policy_from_config_string() {
        let p: FieldFailurePolicy = serde_json::from_str("\"drop\"").unwrap();
        assert_eq!(p, FieldFailurePolicy::DropEntry);
        let p: FieldFailurePolicy = serde_json::from_str("\"keep_degraded\"").unwrap();
        assert_eq!(p, FieldFailurePolicy::KeepDegraded);
    }
}
