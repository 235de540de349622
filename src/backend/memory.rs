//! In-process implementations of the backend collaborators.
//!
//! They honour the same contracts as the hosted services (server timestamps,
//! cursor positioning, progress streams, auth state streams) and back the
//! demo binary and the test suites.

use crate::backend::traits::{AuthProvider, BlobStore, DocumentStore};
use crate::backend::types::{
    AuthStream, AuthUser, Cursor, Direction, Document, Page, Query, Record, UploadEvent,
    UploadStream, SERVER_TIMESTAMP_FIELD,
};
use crate::error::{AuthError, BlobError, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use futures::stream::{self, StreamExt};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::debug;
use uuid::Uuid;

/// Kind of write that reached a [`MemoryStore`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Create,
    Set,
    Update,
    Delete,
}

/// Write accepted by a [`MemoryStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOp {
    pub kind: WriteKind,
    pub collection: String,
    pub id: String,
}

#[derive(Default)]
struct StoreState {
    collections: HashMap<String, BTreeMap<String, Map<String, Value>>>,
    last_stamp: Option<DateTime<Utc>>,
    writes: Vec<WriteOp>,
    unavailable: bool,
}

impl StoreState {
    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable {
            return Err(StoreError::unavailable("store is offline"));
        }
        Ok(())
    }

    /// Strictly increasing server clock at microsecond precision
    fn next_stamp(&mut self) -> String {
        let now = Utc::now().trunc_subsecs(6);
        let stamp = match self.last_stamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_stamp = Some(stamp);
        stamp.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    fn prepare(&mut self, record: Record) -> Map<String, Value> {
        let stamp = record.wants_server_timestamp();
        let mut fields = record.into_fields();
        if stamp {
            fields.insert(
                SERVER_TIMESTAMP_FIELD.to_string(),
                Value::String(self.next_stamp()),
            );
        }
        fields
    }

    fn log(&mut self, kind: WriteKind, collection: &str, id: &str) {
        self.writes.push(WriteOp {
            kind,
            collection: collection.to_string(),
            id: id.to_string(),
        });
    }
}

/// Document store kept in memory
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following call fail as if the backend were unreachable
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().await.unavailable = unavailable;
    }

    /// Writes accepted so far, in order
    pub async fn writes(&self) -> Vec<WriteOp> {
        self.state.lock().await.writes.clone()
    }

    pub async fn count(&self, collection: &str) -> usize {
        self.state
            .lock()
            .await
            .collections
            .get(collection)
            .map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create(&self, collection: &str, record: Record) -> Result<String, StoreError> {
        let mut state = self.state.lock().await;
        state.check_available()?;
        let id = Uuid::new_v4().simple().to_string();
        let fields = state.prepare(record);
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), fields);
        state.log(WriteKind::Create, collection, &id);
        debug!(collection, id = %id, "Created document");
        Ok(id)
    }

    async fn set(&self, collection: &str, id: &str, record: Record) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.check_available()?;
        let fields = state.prepare(record);
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), fields);
        state.log(WriteKind::Set, collection, id);
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let state = self.state.lock().await;
        state.check_available()?;
        Ok(state
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|data| Document {
                id: id.to_string(),
                data: data.clone(),
            }))
    }

    async fn update(&self, collection: &str, id: &str, patch: Record) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.check_available()?;
        let exists = state
            .collections
            .get(collection)
            .is_some_and(|docs| docs.contains_key(id));
        if !exists {
            return Err(StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        let fields = state.prepare(patch);
        if let Some(doc) = state
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
        {
            doc.extend(fields);
        }
        state.log(WriteKind::Update, collection, id);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.check_available()?;
        if let Some(docs) = state.collections.get_mut(collection) {
            docs.remove(id);
        }
        state.log(WriteKind::Delete, collection, id);
        Ok(())
    }

    async fn query(&self, collection: &str, query: Query) -> Result<Page, StoreError> {
        let state = self.state.lock().await;
        state.check_available()?;

        let scope = query.scope();
        if let Some(cursor) = &query.start_after {
            if cursor.scope() != &scope {
                return Err(StoreError::CursorMismatch);
            }
        }

        let mut documents: Vec<Document> = state
            .collections
            .get(collection)
            .into_iter()
            .flat_map(|docs| docs.iter())
            .filter(|(_, data)| query.filters.iter().all(|f| f.matches(data)))
            .map(|(id, data)| Document {
                id: id.clone(),
                data: data.clone(),
            })
            .collect();

        let sort_field = query.order_by.as_ref().map(|o| o.field.as_str());
        let direction = query
            .order_by
            .as_ref()
            .map_or(Direction::Asc, |o| o.direction);
        documents.sort_by(|a, b| {
            compare_positions(
                sort_value(a, sort_field),
                &a.id,
                sort_value(b, sort_field),
                &b.id,
                direction,
            )
        });

        if let Some(cursor) = &query.start_after {
            documents.retain(|doc| after_cursor(doc, cursor, sort_field, direction));
        }
        if let Some(limit) = query.limit {
            documents.truncate(limit);
        }

        Ok(Page::new(scope, documents))
    }
}

static MISSING: Value = Value::Null;

fn sort_value<'a>(doc: &'a Document, field: Option<&str>) -> &'a Value {
    field.and_then(|f| doc.data.get(f)).unwrap_or(&MISSING)
}

fn after_cursor(doc: &Document, cursor: &Cursor, field: Option<&str>, direction: Direction) -> bool {
    compare_positions(
        sort_value(doc, field),
        &doc.id,
        cursor.last_sort_value(),
        cursor.last_id(),
        direction,
    ) == Ordering::Greater
}

/// Order two documents by sort value, then by id, in query direction
fn compare_positions(
    a: &Value,
    a_id: &str,
    b: &Value,
    b_id: &str,
    direction: Direction,
) -> Ordering {
    let by_value = match direction {
        Direction::Asc => compare_values(a, b),
        Direction::Desc => compare_values(b, a),
    };
    by_value.then_with(|| a_id.cmp(b_id))
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Blob storage kept in memory.
///
/// Uploads can be made to fail or lag by matching a fragment of their path.
pub struct MemoryBlobStore {
    base_url: String,
    chunk_size: usize,
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    failing: Vec<String>,
    delays: Vec<(String, std::time::Duration)>,
}

impl MemoryBlobStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            chunk_size: 64 * 1024,
            objects: Arc::new(Mutex::new(HashMap::new())),
            failing: Vec::new(),
            delays: Vec::new(),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Fail every upload whose path contains `fragment`
    pub fn failing_on(mut self, fragment: impl Into<String>) -> Self {
        self.failing.push(fragment.into());
        self
    }

    /// Hold back completion of uploads whose path contains `fragment`
    pub fn delayed_on(mut self, fragment: impl Into<String>, delay: std::time::Duration) -> Self {
        self.delays.push((fragment.into(), delay));
        self
    }

    pub async fn stored_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.objects.lock().await.keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(path)
        )
    }

    fn progress_events(&self, total: usize) -> Vec<Result<UploadEvent, BlobError>> {
        let total = total as u64;
        let chunk = self.chunk_size as u64;
        let mut events = Vec::new();
        let mut transferred = 0;
        while transferred < total {
            transferred = (transferred + chunk).min(total);
            events.push(Ok(UploadEvent::Progress { transferred, total }));
        }
        events
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new("memory://blobs")
    }
}

impl BlobStore for MemoryBlobStore {
    fn upload(&self, path: &str, bytes: Vec<u8>) -> UploadStream {
        let path = path.to_string();
        let progress = stream::iter(self.progress_events(bytes.len()));

        if self.failing.iter().any(|fragment| path.contains(fragment.as_str())) {
            let failure = BlobError::Failed {
                path,
                message: "storage rejected the object".to_string(),
            };
            return progress
                .take(1)
                .chain(stream::once(async move { Err(failure) }))
                .boxed();
        }

        let delay = self
            .delays
            .iter()
            .find(|(fragment, _)| path.contains(fragment.as_str()))
            .map(|(_, delay)| *delay);
        let url = self.url_for(&path);
        let objects = Arc::clone(&self.objects);
        let finish = stream::once(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            objects.lock().await.insert(path, bytes);
            Ok(UploadEvent::Completed { url })
        });

        progress.chain(finish).boxed()
    }
}

struct Account {
    user: AuthUser,
    /// `None` for accounts created through the identity provider
    password: Option<String>,
}

/// Authentication provider kept in memory
pub struct MemoryAuth {
    current: watch::Sender<Option<AuthUser>>,
    accounts: Mutex<HashMap<String, Account>>,
    provider_identity: Option<AuthUser>,
    resets: Mutex<Vec<String>>,
}

impl MemoryAuth {
    pub const MIN_PASSWORD_LEN: usize = 6;

    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self {
            current,
            accounts: Mutex::new(HashMap::new()),
            provider_identity: None,
            resets: Mutex::new(Vec::new()),
        }
    }

    /// Identity returned by [`AuthProvider::sign_in_with_provider`]
    pub fn with_provider_identity(mut self, user: AuthUser) -> Self {
        self.provider_identity = Some(user);
        self
    }

    /// Emails that were sent a password reset
    pub async fn reset_requests(&self) -> Vec<String> {
        self.resets.lock().await.clone()
    }

    fn publish(&self, user: Option<AuthUser>) {
        self.current.send_replace(user);
    }
}

impl Default for MemoryAuth {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthProvider for MemoryAuth {
    fn current_user(&self) -> Option<AuthUser> {
        self.current.borrow().clone()
    }

    fn auth_events(&self) -> AuthStream {
        let rx = self.current.subscribe();
        stream::unfold((rx, true), |(mut rx, first)| async move {
            if !first {
                rx.changed().await.ok()?;
            }
            let user = rx.borrow_and_update().clone();
            Some((user, (rx, false)))
        })
        .boxed()
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
        if password.len() < Self::MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword {
                min: Self::MIN_PASSWORD_LEN,
            });
        }
        let mut accounts = self.accounts.lock().await;
        let key = email.to_ascii_lowercase();
        if accounts.contains_key(&key) {
            return Err(AuthError::EmailInUse {
                email: email.to_string(),
            });
        }
        let user = AuthUser {
            uid: Uuid::new_v4().simple().to_string(),
            email: email.to_string(),
            display_name: None,
        };
        accounts.insert(
            key,
            Account {
                user: user.clone(),
                password: Some(password.to_string()),
            },
        );
        self.publish(Some(user.clone()));
        Ok(user)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
        let accounts = self.accounts.lock().await;
        let account = accounts
            .get(&email.to_ascii_lowercase())
            .filter(|account| account.password.as_deref() == Some(password))
            .ok_or(AuthError::InvalidCredentials)?;
        let user = account.user.clone();
        self.publish(Some(user.clone()));
        Ok(user)
    }

    async fn sign_in_with_provider(&self) -> Result<AuthUser, AuthError> {
        let identity = self.provider_identity.clone().ok_or(AuthError::Provider {
            message: "no identity provider configured".to_string(),
        })?;
        let mut accounts = self.accounts.lock().await;
        let user = accounts
            .entry(identity.email.to_ascii_lowercase())
            .or_insert_with(|| Account {
                user: identity,
                password: None,
            })
            .user
            .clone();
        self.publish(Some(user.clone()));
        Ok(user)
    }

    async fn update_profile(&self, display_name: &str) -> Result<AuthUser, AuthError> {
        let current = self.current_user().ok_or(AuthError::NotSignedIn)?;
        let mut accounts = self.accounts.lock().await;
        let account = accounts
            .get_mut(&current.email.to_ascii_lowercase())
            .ok_or(AuthError::NotSignedIn)?;
        account.user.display_name = Some(display_name.to_string());
        let user = account.user.clone();
        self.publish(Some(user.clone()));
        Ok(user)
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), AuthError> {
        if !self
            .accounts
            .lock()
            .await
            .contains_key(&email.to_ascii_lowercase())
        {
            return Err(AuthError::UnknownEmail {
                email: email.to_string(),
            });
        }
        self.resets.lock().await.push(email.to_string());
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.publish(None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::types::{Filter, OrderBy};
    use serde_json::json;

    fn record(kind: &str, n: u64) -> Record {
        let mut record = Record::new().with_server_timestamp();
        record.set("type", kind);
        record.set("n", n);
        record
    }

    #[tokio::test]
    async fn test_server_timestamps_strictly_increase() {
        let store = MemoryStore::new();
        let mut stamps = Vec::new();
        for n in 0..20 {
            let id = store.create("items", record("rent", n)).await.unwrap();
            let doc = store.get("items", &id).await.unwrap().unwrap();
            stamps.push(doc.data["timestamp"].as_str().unwrap().to_string());
        }

        assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_query_filters_orders_and_pages() {
        let store = MemoryStore::new();
        for n in 0..5 {
            store.create("items", record("rent", n)).await.unwrap();
            store.create("items", record("sale", n)).await.unwrap();
        }

        let query = Query::new()
            .filter(Filter::eq("type", "rent"))
            .order_by(OrderBy::desc("timestamp"))
            .limit(3);
        let first = store.query("items", query.clone()).await.unwrap();
        let ns: Vec<u64> = first.documents.iter().map(|d| d.data["n"].as_u64().unwrap()).collect();
        assert_eq!(ns, vec![4, 3, 2]);

        let cursor = first.cursor.clone().unwrap();
        let second = store.query("items", query.start_after(cursor)).await.unwrap();
        let ns: Vec<u64> = second.documents.iter().map(|d| d.data["n"].as_u64().unwrap()).collect();
        assert_eq!(ns, vec![1, 0]);

        // Short pages still carry a cursor; following it yields nothing
        let cursor = second.cursor.clone().unwrap();
        let third = store
            .query(
                "items",
                Query::new()
                    .filter(Filter::eq("type", "rent"))
                    .order_by(OrderBy::desc("timestamp"))
                    .limit(3)
                    .start_after(cursor),
            )
            .await
            .unwrap();
        assert!(third.is_empty());
        assert!(third.cursor.is_none());
    }

    #[tokio::test]
    async fn test_cursor_bound_to_query_scope() {
        let store = MemoryStore::new();
        store.create("items", record("rent", 1)).await.unwrap();

        let page = store
            .query(
                "items",
                Query::new().filter(Filter::eq("type", "rent")).order_by(OrderBy::desc("timestamp")),
            )
            .await
            .unwrap();
        let cursor = page.cursor.unwrap();

        let result = store
            .query(
                "items",
                Query::new()
                    .filter(Filter::eq("type", "sale"))
                    .order_by(OrderBy::desc("timestamp"))
                    .start_after(cursor),
            )
            .await;
        assert_eq!(result, Err(StoreError::CursorMismatch));
    }

    #[tokio::test]
    async fn test_update_merges_and_requires_document() {
        let store = MemoryStore::new();
        store
            .set("users", "U1", Record::from_serialize(&json!({"name": "Ann", "email": "a@x"})).unwrap())
            .await
            .unwrap();

        let mut patch = Record::new();
        patch.set("name", "Anna");
        store.update("users", "U1", patch.clone()).await.unwrap();

        let doc = store.get("users", "U1").await.unwrap().unwrap();
        assert_eq!(doc.data["name"], "Anna");
        assert_eq!(doc.data["email"], "a@x");
        assert!(!doc.data.contains_key("timestamp"));

        let missing = store.update("users", "U2", patch).await;
        assert!(matches!(missing, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_unavailable_store_rejects_calls() {
        let store = MemoryStore::new();
        store.set_unavailable(true).await;

        let result = store.create("items", record("rent", 1)).await;
        assert!(matches!(result, Err(StoreError::Unavailable { .. })));
        assert!(store.writes().await.is_empty());
    }

    #[tokio::test]
    async fn test_blob_upload_reports_progress_then_url() {
        let blobs = MemoryBlobStore::new("https://cdn.test").with_chunk_size(4);
        let events: Vec<_> = blobs.upload("images/a.png", vec![0; 10]).collect().await;

        assert_eq!(
            events,
            vec![
                Ok(UploadEvent::Progress { transferred: 4, total: 10 }),
                Ok(UploadEvent::Progress { transferred: 8, total: 10 }),
                Ok(UploadEvent::Progress { transferred: 10, total: 10 }),
                Ok(UploadEvent::Completed {
                    url: "https://cdn.test/images%2Fa.png".to_string()
                }),
            ]
        );
        assert_eq!(blobs.stored_paths().await, vec!["images/a.png".to_string()]);
    }

    #[tokio::test]
    async fn test_blob_upload_failure_stores_nothing() {
        let blobs = MemoryBlobStore::default().failing_on("broken");
        let events: Vec<_> = blobs.upload("images/broken.png", vec![1, 2, 3]).collect().await;

        assert!(matches!(events.last(), Some(Err(BlobError::Failed { .. }))));
        assert!(blobs.stored_paths().await.is_empty());
    }

    #[tokio::test]
    async fn test_auth_events_start_with_current_state() {
        let auth = MemoryAuth::new();
        let mut events = auth.auth_events();
        assert_eq!(events.next().await, Some(None));

        let user = auth.sign_up("ann@example.com", "secret1").await.unwrap();
        assert_eq!(events.next().await, Some(Some(user.clone())));

        auth.sign_out().await.unwrap();
        assert_eq!(events.next().await, Some(None));
        assert!(auth.current_user().is_none());

        let again = auth.sign_in("ann@example.com", "secret1").await.unwrap();
        assert_eq!(again.uid, user.uid);
        assert_eq!(
            auth.sign_in("ann@example.com", "wrong").await,
            Err(AuthError::InvalidCredentials)
        );
    }

    #[tokio::test]
    async fn test_provider_account_has_no_password() {
        let auth = MemoryAuth::new().with_provider_identity(AuthUser {
            uid: "G1".to_string(),
            email: "g@example.com".to_string(),
            display_name: Some("Gee".to_string()),
        });
        auth.sign_in_with_provider().await.unwrap();
        auth.sign_out().await.unwrap();

        assert_eq!(
            auth.sign_in("g@example.com", "").await,
            Err(AuthError::InvalidCredentials)
        );
        assert!(auth.current_user().is_none());
        assert_eq!(auth.sign_in_with_provider().await.unwrap().uid, "G1");
    }
}
