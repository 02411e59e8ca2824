//! # Route Table
//!
//! Per-method buckets of route records kept in registration order.
//! Re-registering a `(method, template)` pair overwrites the record in
//! place, so it keeps its original precedence.

use crate::route::RouteRecord;
use crate::router::Method;
use std::collections::{BTreeMap, HashMap};

/// Routes of one method, in registration order
#[derive(Debug, Clone, Default)]
pub struct Bucket {
    records: Vec<RouteRecord>,
    /// template → position in `records`
    index: HashMap<String, usize>,
}

impl Bucket {
    /// Records in registration order
    pub fn iter(&self) -> std::slice::Iter<'_, RouteRecord> {
        self.records.iter()
    }

    /// Whether `uri` is registered in this bucket
    #[must_use]
    pub fn contains(&self, uri: &str) -> bool {
        self.index.contains_key(uri)
    }

    fn get_mut(&mut self, uri: &str) -> Option<&mut RouteRecord> {
        let i = *self.index.get(uri)?;
        self.records.get_mut(i)
    }

    fn insert(&mut self, record: RouteRecord) {
        if let Some(&i) = self.index.get(record.uri()) {
            self.records[i] = record;
        } else {
            self.index.insert(record.uri().to_string(), self.records.len());
            self.records.push(record);
        }
    }

    /// Number of records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the bucket is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// All registered routes, bucketed by method
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    buckets: BTreeMap<Method, Bucket>,
}

impl RouteTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `record`, overwriting any record with the same method and template
    pub fn insert(&mut self, record: RouteRecord) {
        self.buckets.entry(record.method()).or_default().insert(record);
    }

    /// Mutable record for `(method, uri)`
    pub fn get_mut(&mut self, method: Method, uri: &str) -> Option<&mut RouteRecord> {
        self.buckets.get_mut(&method)?.get_mut(uri)
    }

    /// Every record registered under `uri`, whatever the method
    pub fn records_for_uri_mut<'a>(
        &'a mut self,
        uri: &'a str,
    ) -> impl Iterator<Item = &'a mut RouteRecord> + 'a {
        self.buckets.values_mut().filter_map(move |b| b.get_mut(uri))
    }

    /// Bucket for `method`
    #[must_use]
    pub fn bucket(&self, method: Method) -> Option<&Bucket> {
        self.buckets.get(&method)
    }

    /// Non-empty buckets in method order
    pub fn buckets(&self) -> impl Iterator<Item = (Method, &Bucket)> {
        self.buckets.iter().map(|(m, b)| (*m, b))
    }

    /// Drain into records, bucket by bucket, each in registration order
    pub fn into_records(self) -> impl Iterator<Item = RouteRecord> {
        self.buckets.into_values().flat_map(|b| b.records)
    }

    /// Total number of records
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.values().map(Bucket::len).sum()
    }

    /// Whether no route is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.values().all(Bucket::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler;
    use crate::response::Response;
    use crate::route::{Action, Constraints};

    fn record(method: Method, uri: &str, body: &'static str) -> RouteRecord {
        let action = Action::from(handler(move |_req| async move { Ok(Response::text(body)) }));
        RouteRecord::new(method, uri.to_string(), action, Constraints::new())
    }

    #[test]
    fn test_insertion_order_preserved() {
        let mut table = RouteTable::new();
        table.insert(record(Method::Get, "/b", "b"));
        table.insert(record(Method::Get, "/a", "a"));
        table.insert(record(Method::Post, "/a", "a"));

        let uris: Vec<&str> = table
            .bucket(Method::Get)
            .unwrap()
            .iter()
            .map(RouteRecord::uri)
            .collect();
        assert_eq!(uris, vec!["/b", "/a"]);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_overwrite_keeps_position() {
        let mut table = RouteTable::new();
        table.insert(record(Method::Get, "/first", "1"));
        table.insert(record(Method::Get, "/second", "2"));
        table.get_mut(Method::Get, "/first").unwrap().set_name("first".into());

        table.insert(record(Method::Get, "/first", "1b"));

        let bucket = table.bucket(Method::Get).unwrap();
        assert_eq!(bucket.len(), 2);
        assert_eq!(bucket.iter().next().unwrap().uri(), "/first");
        assert!(bucket.contains("/first"));
        assert_eq!(bucket.iter().next().unwrap().name(), None);
    }

    #[test]
    fn test_records_for_uri_spans_methods() {
        let mut table = RouteTable::new();
        table.insert(record(Method::Get, "/x", "g"));
        table.insert(record(Method::Delete, "/x", "d"));
        table.insert(record(Method::Get, "/y", "y"));

        assert_eq!(table.records_for_uri_mut("/x").count(), 2);
        assert!(!table.is_empty());
        assert_eq!(table.into_records().count(), 3);
    }
}
