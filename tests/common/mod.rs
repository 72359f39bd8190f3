//! Shared fixtures: an in-memory phrase store with transactional staging,
//! an in-memory settings repository, and a recording notification sink.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rand::seq::SliceRandom;
use time::OffsetDateTime;

use rondo::application::dispatch::{NotificationSink, SinkError};
use rondo::application::repos::{PhraseStore, PhraseUnit, RepoError, SettingsRepo};
use rondo::domain::entities::{DigestSettingsRecord, PhraseRecord, ReplyRecord};

pub fn make_phrase(id: i64) -> PhraseRecord {
    PhraseRecord {
        id,
        text: format!("phrase {id}"),
        translation: format!("번역 {id}"),
        note: None,
        tag: None,
        cycle_number: 0,
        last_delivered_at: None,
        created_at: OffsetDateTime::UNIX_EPOCH,
        updated_at: OffsetDateTime::UNIX_EPOCH,
        replies: Vec::new(),
    }
}

pub fn make_delivered_phrase(id: i64, cycle: i32) -> PhraseRecord {
    let mut phrase = make_phrase(id);
    phrase.cycle_number = cycle;
    phrase.last_delivered_at = Some(OffsetDateTime::UNIX_EPOCH);
    phrase
}

pub fn make_reply(id: i64, phrase_id: i64) -> ReplyRecord {
    ReplyRecord {
        id,
        phrase_id,
        text: format!("reply {id}"),
        translation: format!("답변 {id}"),
        updated_at: OffsetDateTime::UNIX_EPOCH,
    }
}

// ============================================================================
// In-memory phrase store
// ============================================================================

/// Catalog held in a shared map. `begin` clones the map into a staged copy;
/// only `commit` publishes it back, mirroring the all-or-nothing contract
/// of the Postgres unit.
#[derive(Default, Clone)]
pub struct MemoryPhraseStore {
    rows: Arc<Mutex<BTreeMap<i64, PhraseRecord>>>,
}

impl MemoryPhraseStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(count: usize) -> Self {
        let store = Self::new();
        for id in 1..=count as i64 {
            store.insert(make_phrase(id));
        }
        store
    }

    pub fn insert(&self, record: PhraseRecord) {
        self.rows
            .lock()
            .expect("store lock poisoned")
            .insert(record.id, record);
    }

    pub fn get(&self, id: i64) -> Option<PhraseRecord> {
        self.rows.lock().expect("store lock poisoned").get(&id).cloned()
    }

    pub fn snapshot(&self) -> Vec<PhraseRecord> {
        self.rows
            .lock()
            .expect("store lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn delivered_ids(&self) -> Vec<i64> {
        self.snapshot()
            .into_iter()
            .filter(|phrase| phrase.last_delivered_at.is_some())
            .map(|phrase| phrase.id)
            .collect()
    }
}

pub struct MemoryPhraseUnit {
    shared: Arc<Mutex<BTreeMap<i64, PhraseRecord>>>,
    staged: BTreeMap<i64, PhraseRecord>,
}

impl MemoryPhraseUnit {
    fn pick_random(mut ids: Vec<i64>, limit: i64) -> Vec<i64> {
        ids.shuffle(&mut rand::thread_rng());
        ids.truncate(limit.max(0) as usize);
        ids
    }
}

#[async_trait]
impl PhraseStore for MemoryPhraseStore {
    async fn begin(&self) -> Result<Box<dyn PhraseUnit>, RepoError> {
        let staged = self.rows.lock().expect("store lock poisoned").clone();
        Ok(Box::new(MemoryPhraseUnit {
            shared: self.rows.clone(),
            staged,
        }))
    }

    async fn load_phrase(&self, id: i64) -> Result<Option<PhraseRecord>, RepoError> {
        Ok(self.get(id))
    }
}

#[async_trait]
impl PhraseUnit for MemoryPhraseUnit {
    async fn count_total(&mut self) -> Result<i64, RepoError> {
        Ok(self.staged.len() as i64)
    }

    async fn current_cycle(&mut self) -> Result<i32, RepoError> {
        Ok(self
            .staged
            .values()
            .filter(|phrase| phrase.last_delivered_at.is_some())
            .map(|phrase| phrase.cycle_number)
            .max()
            .unwrap_or(0))
    }

    async fn count_at_cycle(&mut self, cycle: i32) -> Result<i64, RepoError> {
        Ok(self
            .staged
            .values()
            .filter(|phrase| phrase.cycle_number == cycle)
            .count() as i64)
    }

    async fn find_eligible_stray(&mut self, limit: i64) -> Result<Vec<i64>, RepoError> {
        let ids = self
            .staged
            .values()
            .filter(|phrase| phrase.is_stray())
            .map(|phrase| phrase.id)
            .collect();
        Ok(Self::pick_random(ids, limit))
    }

    async fn find_unsent_excluding(
        &mut self,
        exclude: &[i64],
        limit: i64,
    ) -> Result<Vec<i64>, RepoError> {
        let ids = self
            .staged
            .values()
            .filter(|phrase| phrase.last_delivered_at.is_none() && !exclude.contains(&phrase.id))
            .map(|phrase| phrase.id)
            .collect();
        Ok(Self::pick_random(ids, limit))
    }

    async fn find_eligible_rotation(
        &mut self,
        before_cycle: i32,
        limit: i64,
    ) -> Result<Vec<i64>, RepoError> {
        let ids = self
            .staged
            .values()
            .filter(|phrase| phrase.cycle_number < before_cycle)
            .map(|phrase| phrase.id)
            .collect();
        Ok(Self::pick_random(ids, limit))
    }

    async fn reset_all(&mut self) -> Result<u64, RepoError> {
        let mut touched = 0;
        for phrase in self.staged.values_mut() {
            phrase.cycle_number = 0;
            phrase.last_delivered_at = None;
            touched += 1;
        }
        Ok(touched)
    }

    async fn reset_except(&mut self, keep: &[i64]) -> Result<u64, RepoError> {
        let mut touched = 0;
        for phrase in self.staged.values_mut() {
            if !keep.contains(&phrase.id) {
                phrase.cycle_number = 0;
                phrase.last_delivered_at = None;
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn mark_delivered(
        &mut self,
        ids: &[i64],
        cycle: i32,
        at: OffsetDateTime,
    ) -> Result<u64, RepoError> {
        let mut touched = 0;
        for id in ids {
            if let Some(phrase) = self.staged.get_mut(id) {
                phrase.cycle_number = cycle;
                phrase.last_delivered_at = Some(at);
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn fetch_detail(&mut self, ids: &[i64]) -> Result<Vec<PhraseRecord>, RepoError> {
        let mut phrases: Vec<PhraseRecord> = ids
            .iter()
            .filter_map(|id| self.staged.get(id).cloned())
            .collect();
        phrases.sort_by_key(|phrase| phrase.id);
        for phrase in &mut phrases {
            phrase.replies.sort_by_key(|reply| reply.id);
        }
        Ok(phrases)
    }

    async fn commit(self: Box<Self>) -> Result<(), RepoError> {
        *self.shared.lock().expect("store lock poisoned") = self.staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepoError> {
        Ok(())
    }
}

// ============================================================================
// In-memory settings repository
// ============================================================================

#[derive(Default)]
pub struct MemorySettingsRepo {
    row: Mutex<Option<DigestSettingsRecord>>,
    loads: AtomicUsize,
}

impl MemorySettingsRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_row(record: DigestSettingsRecord) -> Self {
        Self {
            row: Mutex::new(Some(record)),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SettingsRepo for MemorySettingsRepo {
    async fn load_digest_settings(&self) -> Result<Option<DigestSettingsRecord>, RepoError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.row.lock().expect("settings lock poisoned").clone())
    }

    async fn upsert_digest_settings(
        &self,
        settings: DigestSettingsRecord,
    ) -> Result<(), RepoError> {
        *self.row.lock().expect("settings lock poisoned") = Some(settings);
        Ok(())
    }
}

// ============================================================================
// Recording sink
// ============================================================================

#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let sink = Self::default();
        sink.fail.store(true, Ordering::SeqCst);
        sink
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().expect("sink lock poisoned").clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send(&self, rendered: &str) -> Result<(), SinkError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SinkError::Rejected("channel_not_found".to_string()));
        }
        self.sent
            .lock()
            .expect("sink lock poisoned")
            .push(rendered.to_string());
        Ok(())
    }
}
