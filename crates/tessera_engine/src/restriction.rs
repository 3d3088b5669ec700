//! Key restrictions and their resolution into concrete target rows.
//!
//! A prepared statement carries one [`Restriction`] per restricted primary
//! key column. The [`KeyResolver`] turns those restrictions, bound against
//! the execution options, into the exact partition keys and the clustering
//! selector the rest of the engine works with.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::error::WriteError;
use crate::options::StatementOptions;
use crate::schema::{Clustering, PartitionKey, TableSchema, Value};

/// A literal or a bind-marker slot in a prepared statement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Term {
    Literal(Value),
    Marker(usize),
}

impl Term {
    pub fn literal(value: Value) -> Self {
        Term::Literal(value)
    }

    pub fn bind(&self, options: &StatementOptions) -> Result<Value, WriteError> {
        match self {
            Term::Literal(value) => Ok(value.clone()),
            Term::Marker(slot) => options.bound_value(*slot).cloned(),
        }
    }
}

/// One bound of a range restriction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RangeBound {
    pub term: Term,
    pub inclusive: bool,
}

/// Predicate bound to a single primary key column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Restriction {
    Eq(Term),
    In(Vec<Term>),
    Range {
        start: Option<RangeBound>,
        end: Option<RangeBound>,
    },
}

/// Per-statement collection of primary key restrictions.
#[derive(Clone, Debug, Default)]
pub struct KeyRestrictions {
    by_column: HashMap<String, Restriction>,
}

impl KeyRestrictions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(
        &mut self,
        column: impl Into<String>,
        restriction: Restriction,
    ) -> Result<(), WriteError> {
        let column = column.into();
        if self.by_column.contains_key(&column) {
            return Err(WriteError::DuplicateKeyRestriction(column));
        }
        self.by_column.insert(column, restriction);
        Ok(())
    }

    pub fn get(&self, column: &str) -> Option<&Restriction> {
        self.by_column.get(column)
    }

    pub fn restricts_any_clustering(&self, schema: &TableSchema) -> bool {
        schema
            .clustering
            .iter()
            .any(|spec| self.by_column.contains_key(&spec.name))
    }
}

/// One bound of a clustering slice; tuples may be a strict prefix of the
/// full clustering, in which case every extension of the prefix is inside
/// the bound.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SliceBound {
    Unbounded,
    Inclusive(Clustering),
    Exclusive(Clustering),
}

/// A contiguous range over clustering tuples.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SliceBounds {
    pub start: SliceBound,
    pub end: SliceBound,
}

fn prefix_compare(a: &[Value], b: &[Value]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        match x.cmp(y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

impl SliceBounds {
    pub fn unbounded() -> Self {
        Self {
            start: SliceBound::Unbounded,
            end: SliceBound::Unbounded,
        }
    }

    /// True when no clustering tuple can fall inside the bounds; such
    /// slices are legal no-ops and are skipped during update building.
    pub fn is_empty(&self) -> bool {
        let (start, start_inclusive) = match &self.start {
            SliceBound::Unbounded => return false,
            SliceBound::Inclusive(t) => (t, true),
            SliceBound::Exclusive(t) => (t, false),
        };
        let (end, end_inclusive) = match &self.end {
            SliceBound::Unbounded => return false,
            SliceBound::Inclusive(t) => (t, true),
            SliceBound::Exclusive(t) => (t, false),
        };
        match prefix_compare(start, end) {
            Ordering::Greater => true,
            Ordering::Equal => !(start_inclusive && end_inclusive),
            Ordering::Less => false,
        }
    }

    pub fn contains(&self, clustering: &[Value]) -> bool {
        let after_start = match &self.start {
            SliceBound::Unbounded => true,
            SliceBound::Inclusive(t) => prefix_compare(clustering, t) != Ordering::Less,
            SliceBound::Exclusive(t) => prefix_compare(clustering, t) == Ordering::Greater,
        };
        let before_end = match &self.end {
            SliceBound::Unbounded => true,
            SliceBound::Inclusive(t) => prefix_compare(clustering, t) != Ordering::Greater,
            SliceBound::Exclusive(t) => prefix_compare(clustering, t) == Ordering::Less,
        };
        after_start && before_end
    }
}

/// Which rows of each target partition a statement addresses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClusteringSelector {
    /// An explicit, finite set of clustering tuples.
    Tuples(Vec<Clustering>),
    /// A contiguous range of clustering tuples.
    Slice(SliceBounds),
    /// The static row only.
    Static,
}

/// Resolves bound restrictions into target partition keys and clusterings.
pub struct KeyResolver<'a> {
    schema: &'a TableSchema,
    restrictions: &'a KeyRestrictions,
}

impl<'a> KeyResolver<'a> {
    pub fn new(schema: &'a TableSchema, restrictions: &'a KeyRestrictions) -> Self {
        Self {
            schema,
            restrictions,
        }
    }

    fn bind_distinct(terms: &[Term], options: &StatementOptions) -> Result<Vec<Value>, WriteError> {
        let mut values = Vec::with_capacity(terms.len());
        for term in terms {
            let value = term.bind(options)?;
            if !values.contains(&value) {
                values.push(value);
            }
        }
        Ok(values)
    }

    /// Ordered list of target partition keys.
    ///
    /// Every partition key column must carry a restriction; only the last
    /// component may be multi-valued, in which case the result is the
    /// cross product with the fixed prefix.
    pub fn partition_keys(
        &self,
        options: &StatementOptions,
    ) -> Result<Vec<PartitionKey>, WriteError> {
        let last = self.schema.partition_key.len().saturating_sub(1);
        let mut keys: Vec<Vec<Value>> = vec![Vec::new()];

        for (idx, spec) in self.schema.partition_key.iter().enumerate() {
            let restriction = self
                .restrictions
                .get(&spec.name)
                .ok_or_else(|| WriteError::MissingKeyComponent(spec.name.clone()))?;

            match restriction {
                Restriction::Eq(term) => {
                    let value = term.bind(options)?;
                    for key in &mut keys {
                        key.push(value.clone());
                    }
                }
                Restriction::In(terms) => {
                    if idx != last {
                        return Err(WriteError::MultiValuedKeyComponent(spec.name.clone()));
                    }
                    let values = Self::bind_distinct(terms, options)?;
                    let mut expanded = Vec::with_capacity(keys.len() * values.len());
                    for key in &keys {
                        for value in &values {
                            let mut next = key.clone();
                            next.push(value.clone());
                            expanded.push(next);
                        }
                    }
                    keys = expanded;
                }
                Restriction::Range { .. } => {
                    return Err(WriteError::InvalidKeyOperator(spec.name.clone()));
                }
            }
        }

        Ok(keys.into_iter().map(PartitionKey).collect())
    }

    /// Resolves the clustering selector.
    ///
    /// `require_full_clustering` is set for statements that write concrete
    /// rows (insert/update); `allow_slices` for statements that may address
    /// row ranges (delete).
    pub fn clustering_selector(
        &self,
        options: &StatementOptions,
        applies_only_to_static: bool,
        require_full_clustering: bool,
        allow_slices: bool,
    ) -> Result<ClusteringSelector, WriteError> {
        let restricted = self.restrictions.restricts_any_clustering(self.schema);
        if applies_only_to_static && !restricted {
            return Ok(ClusteringSelector::Static);
        }
        if self.schema.clustering.is_empty() {
            return Ok(ClusteringSelector::Tuples(vec![Vec::new()]));
        }
        if !restricted {
            // Whole-partition target.
            if allow_slices {
                return Ok(ClusteringSelector::Slice(SliceBounds::unbounded()));
            }
            if require_full_clustering {
                return Err(WriteError::MissingKeyComponent(
                    self.schema.clustering[0].name.clone(),
                ));
            }
            return Ok(ClusteringSelector::Tuples(vec![Vec::new()]));
        }

        let mut tuples: Vec<Clustering> = vec![Vec::new()];
        let mut first_missing: Option<&str> = None;
        let mut slice: Option<SliceBounds> = None;
        let mut multi_valued = false;

        for spec in &self.schema.clustering {
            let Some(restriction) = self.restrictions.get(&spec.name) else {
                if first_missing.is_none() {
                    first_missing = Some(&spec.name);
                }
                continue;
            };
            if let Some(missing) = first_missing {
                return Err(WriteError::MissingClusteringComponent {
                    missing: missing.to_string(),
                    set: spec.name.clone(),
                });
            }
            if slice.is_some() {
                return Err(WriteError::MixedClusteringForm);
            }

            match restriction {
                Restriction::Eq(term) => {
                    let value = term.bind(options)?;
                    for tuple in &mut tuples {
                        tuple.push(value.clone());
                    }
                }
                Restriction::In(terms) => {
                    multi_valued = true;
                    let values = Self::bind_distinct(terms, options)?;
                    let mut expanded = Vec::with_capacity(tuples.len() * values.len());
                    for tuple in &tuples {
                        for value in &values {
                            let mut next = tuple.clone();
                            next.push(value.clone());
                            expanded.push(next);
                        }
                    }
                    tuples = expanded;
                }
                Restriction::Range { start, end } => {
                    if !allow_slices {
                        return Err(WriteError::InvalidKeyOperator(spec.name.clone()));
                    }
                    if multi_valued || tuples.len() != 1 {
                        return Err(WriteError::MixedClusteringForm);
                    }
                    let prefix = tuples[0].clone();
                    slice = Some(SliceBounds {
                        start: Self::slice_bound(&prefix, start.as_ref(), options)?,
                        end: Self::slice_bound(&prefix, end.as_ref(), options)?,
                    });
                }
            }
        }

        if let Some(bounds) = slice {
            return Ok(ClusteringSelector::Slice(bounds));
        }

        // An IN that binds zero values leaves no target rows; that is a
        // legal no-op, not an error.
        let restricted_len = tuples.first().map_or(0, Vec::len);
        if require_full_clustering
            && !tuples.is_empty()
            && restricted_len < self.schema.clustering.len()
        {
            return Err(WriteError::MissingKeyComponent(
                self.schema.clustering[restricted_len].name.clone(),
            ));
        }
        Ok(ClusteringSelector::Tuples(tuples))
    }

    fn slice_bound(
        prefix: &[Value],
        bound: Option<&RangeBound>,
        options: &StatementOptions,
    ) -> Result<SliceBound, WriteError> {
        match bound {
            Some(range_bound) => {
                let mut tuple = prefix.to_vec();
                tuple.push(range_bound.term.bind(options)?);
                Ok(if range_bound.inclusive {
                    SliceBound::Inclusive(tuple)
                } else {
                    SliceBound::Exclusive(tuple)
                })
            }
            None if prefix.is_empty() => Ok(SliceBound::Unbounded),
            None => Ok(SliceBound::Inclusive(prefix.to_vec())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consistency::ConsistencyLevel;
    use crate::schema::{ColumnSpec, DataType};

    fn schema() -> TableSchema {
        TableSchema::new(
            "ks",
            "t",
            vec![
                ColumnSpec::new("pk1", DataType::Bigint),
                ColumnSpec::new("pk2", DataType::Bigint),
            ],
            vec![
                ColumnSpec::new("ck1", DataType::Bigint),
                ColumnSpec::new("ck2", DataType::Bigint),
            ],
            vec![ColumnSpec::new("v", DataType::Int)],
            vec![ColumnSpec::new("s", DataType::Text)],
        )
    }

    fn options() -> StatementOptions {
        StatementOptions::new(ConsistencyLevel::Quorum)
    }

    fn eq(value: i64) -> Restriction {
        Restriction::Eq(Term::literal(Value::Bigint(value)))
    }

    fn r#in(values: &[i64]) -> Restriction {
        Restriction::In(
            values
                .iter()
                .map(|v| Term::literal(Value::Bigint(*v)))
                .collect(),
        )
    }

    #[test]
    fn missing_partition_component_fails() {
        let schema = schema();
        let mut restrictions = KeyRestrictions::new();
        restrictions.set("pk1", eq(1)).unwrap();

        let err = KeyResolver::new(&schema, &restrictions)
            .partition_keys(&options())
            .unwrap_err();
        assert_eq!(err, WriteError::MissingKeyComponent("pk2".to_string()));
    }

    #[test]
    fn in_on_last_component_builds_cross_product() {
        let schema = schema();
        let mut restrictions = KeyRestrictions::new();
        restrictions.set("pk1", eq(1)).unwrap();
        restrictions.set("pk2", r#in(&[10, 20, 10])).unwrap();

        let keys = KeyResolver::new(&schema, &restrictions)
            .partition_keys(&options())
            .unwrap();
        assert_eq!(
            keys,
            vec![
                PartitionKey(vec![Value::Bigint(1), Value::Bigint(10)]),
                PartitionKey(vec![Value::Bigint(1), Value::Bigint(20)]),
            ]
        );
    }

    #[test]
    fn in_on_leading_component_is_rejected() {
        let schema = schema();
        let mut restrictions = KeyRestrictions::new();
        restrictions.set("pk1", r#in(&[1, 2])).unwrap();
        restrictions.set("pk2", eq(3)).unwrap();

        let err = KeyResolver::new(&schema, &restrictions)
            .partition_keys(&options())
            .unwrap_err();
        assert_eq!(err, WriteError::MultiValuedKeyComponent("pk1".to_string()));
    }

    #[test]
    fn duplicate_restriction_is_rejected() {
        let mut restrictions = KeyRestrictions::new();
        restrictions.set("pk1", eq(1)).unwrap();
        assert_eq!(
            restrictions.set("pk1", eq(2)),
            Err(WriteError::DuplicateKeyRestriction("pk1".to_string()))
        );
    }

    #[test]
    fn clustering_gap_is_rejected() {
        let schema = schema();
        let mut restrictions = KeyRestrictions::new();
        restrictions.set("pk1", eq(1)).unwrap();
        restrictions.set("pk2", eq(2)).unwrap();
        restrictions.set("ck2", eq(9)).unwrap();

        let err = KeyResolver::new(&schema, &restrictions)
            .clustering_selector(&options(), false, false, true)
            .unwrap_err();
        assert_eq!(
            err,
            WriteError::MissingClusteringComponent {
                missing: "ck1".to_string(),
                set: "ck2".to_string(),
            }
        );
    }

    #[test]
    fn equalities_yield_tuples_and_in_expands() {
        let schema = schema();
        let mut restrictions = KeyRestrictions::new();
        restrictions.set("ck1", eq(7)).unwrap();
        restrictions.set("ck2", r#in(&[1, 2])).unwrap();

        let selector = KeyResolver::new(&schema, &restrictions)
            .clustering_selector(&options(), false, true, false)
            .unwrap();
        assert_eq!(
            selector,
            ClusteringSelector::Tuples(vec![
                vec![Value::Bigint(7), Value::Bigint(1)],
                vec![Value::Bigint(7), Value::Bigint(2)],
            ])
        );
    }

    #[test]
    fn range_after_in_is_a_mixed_form() {
        let schema = schema();
        let mut restrictions = KeyRestrictions::new();
        restrictions.set("ck1", r#in(&[1, 2])).unwrap();
        restrictions
            .set(
                "ck2",
                Restriction::Range {
                    start: Some(RangeBound {
                        term: Term::literal(Value::Bigint(0)),
                        inclusive: true,
                    }),
                    end: None,
                },
            )
            .unwrap();

        let err = KeyResolver::new(&schema, &restrictions)
            .clustering_selector(&options(), false, false, true)
            .unwrap_err();
        assert_eq!(err, WriteError::MixedClusteringForm);
    }

    #[test]
    fn trailing_range_builds_a_prefixed_slice() {
        let schema = schema();
        let mut restrictions = KeyRestrictions::new();
        restrictions.set("ck1", eq(7)).unwrap();
        restrictions
            .set(
                "ck2",
                Restriction::Range {
                    start: Some(RangeBound {
                        term: Term::literal(Value::Bigint(3)),
                        inclusive: false,
                    }),
                    end: Some(RangeBound {
                        term: Term::literal(Value::Bigint(9)),
                        inclusive: true,
                    }),
                },
            )
            .unwrap();

        let selector = KeyResolver::new(&schema, &restrictions)
            .clustering_selector(&options(), false, false, true)
            .unwrap();
        let ClusteringSelector::Slice(bounds) = selector else {
            panic!("expected a slice selector");
        };
        assert_eq!(
            bounds.start,
            SliceBound::Exclusive(vec![Value::Bigint(7), Value::Bigint(3)])
        );
        assert_eq!(
            bounds.end,
            SliceBound::Inclusive(vec![Value::Bigint(7), Value::Bigint(9)])
        );
        assert!(!bounds.is_empty());
        assert!(bounds.contains(&[Value::Bigint(7), Value::Bigint(4)]));
        assert!(!bounds.contains(&[Value::Bigint(7), Value::Bigint(3)]));
        assert!(!bounds.contains(&[Value::Bigint(8), Value::Bigint(4)]));
    }

    #[test]
    fn inverted_slice_normalizes_to_empty() {
        let bounds = SliceBounds {
            start: SliceBound::Exclusive(vec![Value::Bigint(5)]),
            end: SliceBound::Exclusive(vec![Value::Bigint(2)]),
        };
        assert!(bounds.is_empty());

        let degenerate = SliceBounds {
            start: SliceBound::Exclusive(vec![Value::Bigint(5)]),
            end: SliceBound::Inclusive(vec![Value::Bigint(5)]),
        };
        assert!(degenerate.is_empty());

        let point = SliceBounds {
            start: SliceBound::Inclusive(vec![Value::Bigint(5)]),
            end: SliceBound::Inclusive(vec![Value::Bigint(5)]),
        };
        assert!(!point.is_empty());
    }

    #[test]
    fn static_only_statement_selects_the_static_row() {
        let schema = schema();
        let restrictions = KeyRestrictions::new();

        let selector = KeyResolver::new(&schema, &restrictions)
            .clustering_selector(&options(), true, false, false)
            .unwrap();
        assert_eq!(selector, ClusteringSelector::Static);
    }

    #[test]
    fn unrestricted_delete_covers_the_whole_partition() {
        let schema = schema();
        let restrictions = KeyRestrictions::new();

        let selector = KeyResolver::new(&schema, &restrictions)
            .clustering_selector(&options(), false, false, true)
            .unwrap();
        assert_eq!(selector, ClusteringSelector::Slice(SliceBounds::unbounded()));
    }

    #[test]
    fn marker_terms_bind_from_options() {
        let schema = schema();
        let mut restrictions = KeyRestrictions::new();
        restrictions.set("pk1", Restriction::Eq(Term::Marker(0))).unwrap();
        restrictions.set("pk2", Restriction::Eq(Term::Marker(1))).unwrap();

        let options = options().with_bound(vec![Value::Bigint(4), Value::Bigint(5)]);
        let keys = KeyResolver::new(&schema, &restrictions)
            .partition_keys(&options)
            .unwrap();
        assert_eq!(
            keys,
            vec![PartitionKey(vec![Value::Bigint(4), Value::Bigint(5)])]
        );

        let unbound = KeyResolver::new(&schema, &restrictions)
            .partition_keys(&StatementOptions::new(ConsistencyLevel::One))
            .unwrap_err();
        assert_eq!(unbound, WriteError::UnboundMarker(0));
    }
}
