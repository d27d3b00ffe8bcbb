use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::id::EventId;

/// Outcome of a hash-field compare-and-set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome {
    Swapped,
    /// The expected value did not match; carries what was observed so
    /// callers can surface it in conflict errors.
    Conflict { current: Option<String> },
}

impl CasOutcome {
    pub fn swapped(&self) -> bool {
        matches!(self, CasOutcome::Swapped)
    }
}

/// One write in a pipelined batch. Pipelines batch round trips; they do
/// not provide cross-key atomicity.
#[derive(Debug, Clone)]
pub enum PipelineOp {
    Set {
        key: String,
        value: String,
        ttl: Option<Duration>,
    },
    HSet {
        key: String,
        fields: Vec<(String, String)>,
    },
    LPush { key: String, value: String },
    RPush { key: String, value: String },
    LTrim { key: String, start: i64, stop: i64 },
    Expire { key: String, ttl: Duration },
    Delete { key: String },
}

/// An entry read back from an event stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEntry {
    pub id: EventId,
    pub fields: HashMap<String, String>,
}

/// In-place edit applied to a list under the key's lock; returns the
/// number of elements it changed. Stands in for server-side scripting
/// on backends that have none.
pub type ListEdit = Box<dyn FnOnce(&mut Vec<String>) -> u64 + Send>;

/// Typed operations over the underlying key-value store.
///
/// Every operation may fail transiently (retriable) or permanently; see
/// [`StoreError`](crate::StoreError). Implementations must make each
/// operation atomic with respect to its key. Blocking stream reads are
/// expected to run on a connection or path that tolerates long waits.
#[async_trait]
pub trait KeyedStore: Send + Sync {
    // Scalars.
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<bool>;

    // Hash records.
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>>;
    async fn hset(&self, key: &str, fields: &[(String, String)]) -> Result<()>;
    async fn hdel(&self, key: &str, field: &str) -> Result<bool>;
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>>;
    /// Atomically add `delta` to an integer field, creating it at zero,
    /// and return the new value.
    async fn hincrby(&self, key: &str, field: &str, delta: i64) -> Result<i64>;
    /// Atomically replace a field iff it currently equals `expected`
    /// (`None` = absent). The single serialisation point for review
    /// state transitions.
    async fn hcompare_and_set(
        &self,
        key: &str,
        field: &str,
        expected: Option<&str>,
        new: &str,
    ) -> Result<CasOutcome>;

    // Lists. Range indices are inclusive and may be negative to count
    // from the tail.
    async fn lpush(&self, key: &str, value: &str) -> Result<u64>;
    async fn rpush(&self, key: &str, value: &str) -> Result<u64>;
    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>>;
    async fn ltrim(&self, key: &str, start: i64, stop: i64) -> Result<()>;
    async fn llen(&self, key: &str) -> Result<u64>;

    /// Keys currently live under a prefix. O(N) over the namespace;
    /// used sparingly for queue enumeration.
    async fn keys(&self, prefix: &str) -> Result<Vec<String>>;

    /// Refresh a key's TTL. Returns false when the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Execute a batch of writes in one round trip.
    async fn pipeline(&self, ops: Vec<PipelineOp>) -> Result<()>;

    /// Run an in-place edit over one list atomically.
    async fn with_list(&self, key: &str, edit: ListEdit) -> Result<u64>;

    // Event streams.
    /// Append an entry with an automatically issued monotonic id,
    /// trimming to approximately `maxlen` entries when given.
    async fn xadd(
        &self,
        key: &str,
        fields: Vec<(String, String)>,
        maxlen: Option<u64>,
    ) -> Result<EventId>;
    /// Entries with ids strictly greater than `after` (`None` = from
    /// the start).
    async fn xrange_after(&self, key: &str, after: Option<EventId>) -> Result<Vec<StreamEntry>>;
    /// Like [`xrange_after`](Self::xrange_after), but when nothing is
    /// available yet, wait up to `timeout` for an append. An empty
    /// result means the wait timed out.
    async fn xread_block(
        &self,
        key: &str,
        after: Option<EventId>,
        timeout: Duration,
    ) -> Result<Vec<StreamEntry>>;
    async fn xlen(&self, key: &str) -> Result<u64>;
}
