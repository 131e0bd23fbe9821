//! Index key values
//!
//! Indexed field values are reduced to `IndexKey`, which carries a total
//! order: Null < Bool < Number < String. Floats are stored as
//! sign-adjusted bits so the derived ordering matches numeric ordering.
//! Dates index as numbers (their epoch millisecond value), identifiers as
//! their canonical string. Values that are not sortable (binary, nested
//! objects, arrays outside array mode) index under Null.

use crate::document::DocValue;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexKey {
    Null,
    Bool(bool),
    /// f64 in total-order bit representation.
    Number(u64),
    String(String),
    /// One component per field of a composite index.
    Composite(Vec<IndexKey>),
}

impl IndexKey {
    pub fn from_number(v: f64) -> Self {
        let bits = v.to_bits();
        let ordered = if (bits >> 63) == 1 {
            !bits
        } else {
            bits ^ (1 << 63)
        };
        IndexKey::Number(ordered)
    }

    pub fn from_string(v: impl Into<String>) -> Self {
        IndexKey::String(v.into())
    }

    /// Reduces a document value to its index key.
    pub fn from_value(value: &DocValue) -> Self {
        match value {
            DocValue::Null => IndexKey::Null,
            DocValue::Bool(b) => IndexKey::Bool(*b),
            DocValue::Number(n) => IndexKey::from_number(*n),
            DocValue::String(s) => IndexKey::String(s.clone()),
            DocValue::Date(ms) => IndexKey::from_number(*ms as f64),
            DocValue::Id(oid) => IndexKey::String(oid.to_hex()),
            DocValue::Binary(_) | DocValue::Array(_) | DocValue::Object(_) => IndexKey::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_ordering_through_bits() {
        let values = [-1.0e9, -2.5, -0.0, 0.0, 0.5, 2.5, 1.0e9];
        for pair in values.windows(2) {
            assert!(IndexKey::from_number(pair[0]) <= IndexKey::from_number(pair[1]));
        }
    }

    #[test]
    fn test_type_rank_ordering() {
        assert!(IndexKey::Null < IndexKey::Bool(false));
        assert!(IndexKey::Bool(true) < IndexKey::from_number(-1.0e18));
        assert!(IndexKey::from_number(1.0e18) < IndexKey::from_string(""));
    }

    #[test]
    fn test_dates_index_as_numbers() {
        let early = IndexKey::from_value(&DocValue::Date(1_000));
        let late = IndexKey::from_value(&DocValue::Date(2_000));
        assert!(early < late);
        assert_eq!(early, IndexKey::from_number(1_000.0));
    }
}
