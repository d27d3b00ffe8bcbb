//! Embedded store engine.
//!
//! Per-key atomicity comes from the shard locks of the underlying
//! concurrent map; expiry is lazy (checked on access). Stream appends
//! wake blocked readers through a per-key [`Notify`].

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::Notify;

use crate::error::Result;
use crate::error::StoreError;
use crate::id::EventId;
use crate::ops::CasOutcome;
use crate::ops::KeyedStore;
use crate::ops::ListEdit;
use crate::ops::PipelineOp;
use crate::ops::StreamEntry;

#[derive(Debug)]
enum Kind {
    Scalar(String),
    Hash(HashMap<String, String>),
    List(VecDeque<String>),
    Stream(StreamState),
}

#[derive(Debug, Default)]
struct StreamState {
    entries: VecDeque<StreamEntry>,
    last_id: EventId,
}

#[derive(Debug)]
struct Slot {
    kind: Kind,
    expires_at: Option<Instant>,
}

impl Slot {
    fn new(kind: Kind) -> Self {
        Self {
            kind,
            expires_at: None,
        }
    }

    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Instant::now())
    }
}

/// In-process [`KeyedStore`] backend.
#[derive(Default)]
pub struct MemoryStore {
    slots: DashMap<String, Slot>,
    watchers: DashMap<String, Arc<Notify>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn now_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    fn watcher(&self, key: &str) -> Arc<Notify> {
        self.watchers
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }

    /// Mutable access to a live slot, creating one with `make` when the
    /// key is absent or expired.
    fn slot_entry(
        &self,
        key: &str,
        make: impl FnOnce() -> Kind,
    ) -> dashmap::mapref::one::RefMut<'_, String, Slot> {
        match self.slots.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().expired() {
                    occupied.insert(Slot::new(make()));
                }
                occupied.into_ref()
            }
            Entry::Vacant(vacant) => vacant.insert(Slot::new(make())),
        }
    }

    /// Mutable access to a live slot, or `None` when absent/expired.
    fn live_slot(&self, key: &str) -> Option<dashmap::mapref::one::RefMut<'_, String, Slot>> {
        let slot = self.slots.get_mut(key)?;
        if slot.expired() {
            drop(slot);
            self.slots.remove(key);
            return None;
        }
        Some(slot)
    }

    fn range_after_inner(&self, key: &str, after: Option<EventId>) -> Result<Vec<StreamEntry>> {
        match self.live_slot(key) {
            None => Ok(Vec::new()),
            Some(slot) => match &slot.kind {
                Kind::Stream(state) => Ok(state
                    .entries
                    .iter()
                    .filter(|entry| after.is_none_or(|id| entry.id > id))
                    .cloned()
                    .collect()),
                _ => Err(StoreError::wrong_type(key)),
            },
        }
    }

    fn apply(&self, op: PipelineOp) -> Result<()> {
        match op {
            PipelineOp::Set { key, value, ttl } => self.set_inner(&key, &value, ttl),
            PipelineOp::HSet { key, fields } => self.hset_inner(&key, &fields),
            PipelineOp::LPush { key, value } => self.lpush_inner(&key, &value).map(|_| ()),
            PipelineOp::RPush { key, value } => self.rpush_inner(&key, &value).map(|_| ()),
            PipelineOp::LTrim { key, start, stop } => self.ltrim_inner(&key, start, stop),
            PipelineOp::Expire { key, ttl } => {
                self.expire_inner(&key, ttl);
                Ok(())
            }
            PipelineOp::Delete { key } => {
                self.slots.remove(&key);
                Ok(())
            }
        }
    }

    fn set_inner(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut slot = Slot::new(Kind::Scalar(value.to_string()));
        slot.expires_at = ttl.map(|d| Instant::now() + d);
        self.slots.insert(key.to_string(), slot);
        Ok(())
    }

    fn hset_inner(&self, key: &str, fields: &[(String, String)]) -> Result<()> {
        let mut slot = self.slot_entry(key, || Kind::Hash(HashMap::new()));
        match &mut slot.kind {
            Kind::Hash(map) => {
                for (field, value) in fields {
                    map.insert(field.clone(), value.clone());
                }
                Ok(())
            }
            _ => Err(StoreError::wrong_type(key)),
        }
    }

    fn lpush_inner(&self, key: &str, value: &str) -> Result<u64> {
        let mut slot = self.slot_entry(key, || Kind::List(VecDeque::new()));
        match &mut slot.kind {
            Kind::List(list) => {
                list.push_front(value.to_string());
                Ok(list.len() as u64)
            }
            _ => Err(StoreError::wrong_type(key)),
        }
    }

    fn rpush_inner(&self, key: &str, value: &str) -> Result<u64> {
        let mut slot = self.slot_entry(key, || Kind::List(VecDeque::new()));
        match &mut slot.kind {
            Kind::List(list) => {
                list.push_back(value.to_string());
                Ok(list.len() as u64)
            }
            _ => Err(StoreError::wrong_type(key)),
        }
    }

    fn ltrim_inner(&self, key: &str, start: i64, stop: i64) -> Result<()> {
        let Some(mut slot) = self.live_slot(key) else {
            return Ok(());
        };
        match &mut slot.kind {
            Kind::List(list) => {
                match resolve_range(list.len(), start, stop) {
                    None => list.clear(),
                    Some((from, to)) => {
                        list.truncate(to + 1);
                        for _ in 0..from {
                            list.pop_front();
                        }
                    }
                }
                Ok(())
            }
            _ => Err(StoreError::wrong_type(key)),
        }
    }

    fn expire_inner(&self, key: &str, ttl: Duration) -> bool {
        match self.live_slot(key) {
            Some(mut slot) => {
                slot.expires_at = Some(Instant::now() + ttl);
                true
            }
            None => false,
        }
    }
}

/// Normalise inclusive, possibly-negative range indices against a list
/// length. `None` means the range selects nothing.
fn resolve_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    if len == 0 {
        return None;
    }
    let len = len as i64;
    let start = if start < 0 { len + start } else { start }.max(0);
    let stop = if stop < 0 { len + stop } else { stop }.min(len - 1);
    if start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

#[async_trait]
impl KeyedStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        match self.live_slot(key) {
            None => Ok(None),
            Some(slot) => match &slot.kind {
                Kind::Scalar(value) => Ok(Some(value.clone())),
                _ => Err(StoreError::wrong_type(key)),
            },
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        self.set_inner(key, value, ttl)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.slots.remove(key).is_some())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        match self.live_slot(key) {
            None => Ok(None),
            Some(slot) => match &slot.kind {
                Kind::Hash(map) => Ok(map.get(field).cloned()),
                _ => Err(StoreError::wrong_type(key)),
            },
        }
    }

    async fn hset(&self, key: &str, fields: &[(String, String)]) -> Result<()> {
        self.hset_inner(key, fields)
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool> {
        match self.live_slot(key) {
            None => Ok(false),
            Some(mut slot) => match &mut slot.kind {
                Kind::Hash(map) => Ok(map.remove(field).is_some()),
                _ => Err(StoreError::wrong_type(key)),
            },
        }
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        match self.live_slot(key) {
            None => Ok(HashMap::new()),
            Some(slot) => match &slot.kind {
                Kind::Hash(map) => Ok(map.clone()),
                _ => Err(StoreError::wrong_type(key)),
            },
        }
    }

    async fn hincrby(&self, key: &str, field: &str, delta: i64) -> Result<i64> {
        let mut slot = self.slot_entry(key, || Kind::Hash(HashMap::new()));
        match &mut slot.kind {
            Kind::Hash(map) => {
                let current = match map.get(field) {
                    None => 0,
                    Some(raw) => raw.parse::<i64>().map_err(|_| {
                        StoreError::corrupt(key, format!("field `{field}` is not an integer"))
                    })?,
                };
                let next = current + delta;
                map.insert(field.to_string(), next.to_string());
                Ok(next)
            }
            _ => Err(StoreError::wrong_type(key)),
        }
    }

    async fn hcompare_and_set(
        &self,
        key: &str,
        field: &str,
        expected: Option<&str>,
        new: &str,
    ) -> Result<CasOutcome> {
        let mut slot = self.slot_entry(key, || Kind::Hash(HashMap::new()));
        match &mut slot.kind {
            Kind::Hash(map) => {
                let current = map.get(field).cloned();
                if current.as_deref() == expected {
                    map.insert(field.to_string(), new.to_string());
                    Ok(CasOutcome::Swapped)
                } else {
                    Ok(CasOutcome::Conflict { current })
                }
            }
            _ => Err(StoreError::wrong_type(key)),
        }
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<u64> {
        self.lpush_inner(key, value)
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<u64> {
        self.rpush_inner(key, value)
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        match self.live_slot(key) {
            None => Ok(Vec::new()),
            Some(slot) => match &slot.kind {
                Kind::List(list) => Ok(match resolve_range(list.len(), start, stop) {
                    None => Vec::new(),
                    Some((from, to)) => list.iter().skip(from).take(to - from + 1).cloned().collect(),
                }),
                _ => Err(StoreError::wrong_type(key)),
            },
        }
    }

    async fn ltrim(&self, key: &str, start: i64, stop: i64) -> Result<()> {
        self.ltrim_inner(key, start, stop)
    }

    async fn llen(&self, key: &str) -> Result<u64> {
        match self.live_slot(key) {
            None => Ok(0),
            Some(slot) => match &slot.kind {
                Kind::List(list) => Ok(list.len() as u64),
                _ => Err(StoreError::wrong_type(key)),
            },
        }
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut out: Vec<String> = self
            .slots
            .iter()
            .filter(|entry| entry.key().starts_with(prefix) && !entry.value().expired())
            .map(|entry| entry.key().clone())
            .collect();
        out.sort();
        Ok(out)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        Ok(self.expire_inner(key, ttl))
    }

    async fn pipeline(&self, ops: Vec<PipelineOp>) -> Result<()> {
        for op in ops {
            self.apply(op)?;
        }
        Ok(())
    }

    async fn with_list(&self, key: &str, edit: ListEdit) -> Result<u64> {
        let mut slot = self.slot_entry(key, || Kind::List(VecDeque::new()));
        match &mut slot.kind {
            Kind::List(list) => {
                let mut items: Vec<String> = list.iter().cloned().collect();
                let changed = edit(&mut items);
                *list = items.into();
                Ok(changed)
            }
            _ => Err(StoreError::wrong_type(key)),
        }
    }

    async fn xadd(
        &self,
        key: &str,
        fields: Vec<(String, String)>,
        maxlen: Option<u64>,
    ) -> Result<EventId> {
        let id = {
            let mut slot = self.slot_entry(key, || Kind::Stream(StreamState::default()));
            match &mut slot.kind {
                Kind::Stream(state) => {
                    let id = state.last_id.next_after(Self::now_ms());
                    state.last_id = id;
                    state.entries.push_back(StreamEntry {
                        id,
                        fields: fields.into_iter().collect(),
                    });
                    if let Some(cap) = maxlen {
                        while state.entries.len() as u64 > cap {
                            state.entries.pop_front();
                        }
                    }
                    id
                }
                _ => return Err(StoreError::wrong_type(key)),
            }
        };
        self.watcher(key).notify_waiters();
        Ok(id)
    }

    async fn xrange_after(&self, key: &str, after: Option<EventId>) -> Result<Vec<StreamEntry>> {
        self.range_after_inner(key, after)
    }

    async fn xread_block(
        &self,
        key: &str,
        after: Option<EventId>,
        timeout: Duration,
    ) -> Result<Vec<StreamEntry>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notify = self.watcher(key);
            let notified = notify.notified();
            tokio::pin!(notified);
            // Register interest before checking so an append between the
            // check and the await still wakes us.
            notified.as_mut().enable();

            let entries = self.range_after_inner(key, after)?;
            if !entries.is_empty() {
                return Ok(entries);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(Vec::new());
            }
            let _ = tokio::time::timeout_at(deadline, notified).await;
            if tokio::time::Instant::now() >= deadline {
                return Ok(self.range_after_inner(key, after)?);
            }
        }
    }

    async fn xlen(&self, key: &str) -> Result<u64> {
        match self.live_slot(key) {
            None => Ok(0),
            Some(slot) => match &slot.kind {
                Kind::Stream(state) => Ok(state.entries.len() as u64),
                _ => Err(StoreError::wrong_type(key)),
            },
        }
    }
}
