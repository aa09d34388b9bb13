//! 📊 Threshold classification — the entire "analytics" department, in one file.
//!
//! A row comes in. Its fields get glued together with a space. If the result
//! parses as an `f64`, it is either over the threshold or it isn't. If it doesn't
//! parse, it never happened. 🦆

use csv::StringRecord;

/// ⚖️ What a single row turned out to be.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum RowVerdict {
    Over(f64),
    Under(f64),
    /// 🙈 not a number. not an error either. just... not our business.
    NotNumeric,
}

/// 🔢 Compares joined row text against a fixed cutoff.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ThresholdClassifier {
    threshold: f64,
}

impl ThresholdClassifier {
    pub(crate) fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub(crate) fn classify(&self, record: &StringRecord) -> RowVerdict {
        let the_joined_text = join_fields(record);
        match the_joined_text.parse::<f64>() {
            // -- 1e400 overflows to inf. that's out of range, not a very large reading.
            Ok(value) if value.is_infinite() && !is_infinity_literal(&the_joined_text) => {
                RowVerdict::NotNumeric
            }
            // -- strictly greater. exactly 100 is still "under". the threshold is generous like that.
            Ok(value) if value > self.threshold => RowVerdict::Over(value),
            Ok(value) => RowVerdict::Under(value),
            Err(_) => RowVerdict::NotNumeric,
        }
    }

    /// 🚨 The line printed when a value trips the wire.
    pub(crate) fn trip_message(&self, value: f64) -> String {
        format!(
            "Analytics Tripped: Value greater than {} => {}",
            self.threshold, value
        )
    }
}

/// ♾️ `inf` / `infinity`, optionally signed, any case. The only texts allowed to parse as infinite.
fn is_infinity_literal(text: &str) -> bool {
    let the_unsigned = text.strip_prefix(['+', '-']).unwrap_or(text);
    the_unsigned.eq_ignore_ascii_case("inf") || the_unsigned.eq_ignore_ascii_case("infinity")
}

/// 🧵 Fields joined with a single space, the way the row is judged.
pub(crate) fn join_fields(record: &StringRecord) -> String {
    record.iter().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(fields: &[&str]) -> StringRecord {
        StringRecord::from(fields.to_vec())
    }

    #[test]
    fn the_one_where_150_trips_42_relaxes_and_abc_is_ignored() {
        let the_classifier = ThresholdClassifier::new(100.0);

        assert_eq!(the_classifier.classify(&row(&["150"])), RowVerdict::Over(150.0));
        assert_eq!(the_classifier.classify(&row(&["abc"])), RowVerdict::NotNumeric);
        assert_eq!(the_classifier.classify(&row(&["42"])), RowVerdict::Under(42.0));
    }

    #[test]
    fn the_one_where_exactly_the_threshold_counts_as_under() {
        let the_classifier = ThresholdClassifier::new(100.0);
        assert_eq!(the_classifier.classify(&row(&["100"])), RowVerdict::Under(100.0));
        assert_eq!(the_classifier.classify(&row(&["100.0001"])), RowVerdict::Over(100.0001));
    }

    #[test]
    fn the_one_where_multi_field_rows_are_judged_as_one_joined_string() {
        let the_classifier = ThresholdClassifier::new(100.0);

        // -- "NET 150" is not a number, no matter how hard it believes
        assert_eq!(
            the_classifier.classify(&row(&["NET", "150"])),
            RowVerdict::NotNumeric
        );
        assert_eq!(join_fields(&row(&["NET", "150"])), "NET 150");
    }

    #[test]
    fn the_one_where_empty_rows_and_padded_numbers_are_not_numbers() {
        let the_classifier = ThresholdClassifier::new(100.0);
        assert_eq!(the_classifier.classify(&row(&[""])), RowVerdict::NotNumeric);
        assert_eq!(the_classifier.classify(&row(&[" 150"])), RowVerdict::NotNumeric);
    }

    #[test]
    fn the_one_where_numbers_too_big_for_f64_are_out_of_range_not_over() {
        let the_classifier = ThresholdClassifier::new(100.0);
        assert_eq!(the_classifier.classify(&row(&["1e400"])), RowVerdict::NotNumeric);
        assert_eq!(the_classifier.classify(&row(&["-1e400"])), RowVerdict::NotNumeric);
        // -- spelled-out infinity is still a valid float, and it is very much over
        assert_eq!(
            the_classifier.classify(&row(&["+Inf"])),
            RowVerdict::Over(f64::INFINITY)
        );
        assert_eq!(
            the_classifier.classify(&row(&["-infinity"])),
            RowVerdict::Under(f64::NEG_INFINITY)
        );
    }

    #[test]
    fn the_one_where_the_trip_message_names_threshold_and_value() {
        let the_classifier = ThresholdClassifier::new(100.0);
        assert_eq!(
            the_classifier.trip_message(150.0),
            "Analytics Tripped: Value greater than 100 => 150"
        );
        assert_eq!(the_classifier.trip_message(150.5), "Analytics Tripped: Value greater than 100 => 150.5");
    }
}
