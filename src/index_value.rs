//! A small closed enum of projectable, comparable key values.
//!
//! Grounded in the teacher's `PointKey` (`dataflow-state/src/key.rs`): that type exists so a
//! single concrete key type can represent lookups of varying column-counts against a dynamically
//! typed row. We need the same thing here for a different reason, every [`Index`] is stored as a
//! `dyn Index<K, V>` trait object, so a secondary index's key (some projection of `V`, of whatever
//! concrete type the cache's schema gives that column) has to be erased to one concrete,
//! object-safe `Ord` type before it can cross the trait boundary.
//!
//! [`Index`]: crate::index::Index

use std::cmp::Ordering;
use std::fmt;

/// An erased, ordered key value used by every [`Index`](crate::index::Index) implementation.
///
/// `Tuple` covers composite (multi-column) secondary-index keys; its element-wise `Ord` gives
/// lexicographic ordering over the projected columns, matching how the primary index over a
/// multi-column cache key would naturally order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexValue {
    Int(i64),
    UInt(u64),
    Text(String),
    Bytes(Vec<u8>),
    Tuple(Vec<IndexValue>),
}

impl PartialOrd for IndexValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Manual `Ord` rather than `#[derive]`: variants of different kinds are only ever compared within
// the same index (every row in a given index projects the same column types), but deriving would
// still require a total order across kinds, so we define one explicitly rather than relying on
// declaration order being meaningful.
impl Ord for IndexValue {
    fn cmp(&self, other: &Self) -> Ordering {
        use IndexValue::*;
        match (self, other) {
            (Int(a), Int(b)) => a.cmp(b),
            (UInt(a), UInt(b)) => a.cmp(b),
            (Text(a), Text(b)) => a.cmp(b),
            (Bytes(a), Bytes(b)) => a.cmp(b),
            (Tuple(a), Tuple(b)) => a.cmp(b),
            (a, b) => rank(a).cmp(&rank(b)),
        }
    }
}

fn rank(v: &IndexValue) -> u8 {
    match v {
        IndexValue::Int(_) => 0,
        IndexValue::UInt(_) => 1,
        IndexValue::Text(_) => 2,
        IndexValue::Bytes(_) => 3,
        IndexValue::Tuple(_) => 4,
    }
}

impl fmt::Display for IndexValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexValue::Int(v) => write!(f, "{v}"),
            IndexValue::UInt(v) => write!(f, "{v}"),
            IndexValue::Text(v) => write!(f, "{v:?}"),
            IndexValue::Bytes(v) => write!(f, "{v:02x?}"),
            IndexValue::Tuple(vs) => {
                write!(f, "(")?;
                for (i, v) in vs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, ")")
            }
        }
    }
}

macro_rules! from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for IndexValue {
            fn from(v: $t) -> Self {
                IndexValue::Int(v as i64)
            }
        })*
    };
}
from_int!(i8, i16, i32, i64, isize);

macro_rules! from_uint {
    ($($t:ty),*) => {
        $(impl From<$t> for IndexValue {
            fn from(v: $t) -> Self {
                IndexValue::UInt(v as u64)
            }
        })*
    };
}
from_uint!(u8, u16, u32, u64, usize);

impl From<String> for IndexValue {
    fn from(v: String) -> Self {
        IndexValue::Text(v)
    }
}

impl From<&str> for IndexValue {
    fn from(v: &str) -> Self {
        IndexValue::Text(v.to_owned())
    }
}

impl From<Vec<u8>> for IndexValue {
    fn from(v: Vec<u8>) -> Self {
        IndexValue::Bytes(v)
    }
}

impl<const N: usize> From<[IndexValue; N]> for IndexValue {
    fn from(v: [IndexValue; N]) -> Self {
        IndexValue::Tuple(v.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_within_a_kind() {
        assert!(IndexValue::from(1i64) < IndexValue::from(2i64));
        assert!(IndexValue::from("a") < IndexValue::from("b"));
    }

    #[test]
    fn tuple_ordering_is_lexicographic() {
        let a = IndexValue::Tuple(vec![1i64.into(), "a".into()]);
        let b = IndexValue::Tuple(vec![1i64.into(), "b".into()]);
        assert!(a < b);
    }

    #[test]
    fn display_renders_tuples() {
        let v = IndexValue::Tuple(vec![1i64.into(), "x".into()]);
        assert_eq!(v.to_string(), "(1, \"x\")");
    }

    use test_strategy::proptest;

    #[proptest]
    fn two_component_tuple_order_matches_component_order(a: (i64, i64), b: (i64, i64)) {
        let ta = IndexValue::Tuple(vec![a.0.into(), a.1.into()]);
        let tb = IndexValue::Tuple(vec![b.0.into(), b.1.into()]);
        assert_eq!(ta.cmp(&tb), a.cmp(&b));
    }

    #[proptest]
    fn ord_is_consistent_with_equality(a: i64, b: i64) {
        let va = IndexValue::from(a);
        let vb = IndexValue::from(b);
        assert_eq!(va == vb, va.cmp(&vb) == std::cmp::Ordering::Equal);
        assert_eq!(a == b, va == vb);
    }
}
