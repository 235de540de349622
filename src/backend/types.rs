use crate::error::{BlobError, StoreError};
use crate::models::GeoPoint;
use futures::stream::BoxStream;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field the store fills with its own clock when a record asks for it
pub const SERVER_TIMESTAMP_FIELD: &str = "timestamp";

/// Field map written to the document store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Map<String, Value>,
    server_timestamp: bool,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize any struct into a record; the value must be a JSON object
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self, StoreError> {
        match serde_json::to_value(value) {
            Ok(Value::Object(fields)) => Ok(Self {
                fields,
                server_timestamp: false,
            }),
            Ok(_) => Err(StoreError::NotAnObject),
            Err(e) => Err(StoreError::Encode {
                message: e.to_string(),
            }),
        }
    }

    /// Ask the store to stamp `timestamp` with server time on write
    pub fn with_server_timestamp(mut self) -> Self {
        self.server_timestamp = true;
        self
    }

    pub fn wants_server_timestamp(&self) -> bool {
        self.server_timestamp
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }
}

/// Document read back from the store
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Map<String, Value>,
}

impl Document {
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        serde_json::from_value(Value::Object(self.data.clone())).map_err(|e| StoreError::Decode {
            id: self.id.clone(),
            message: e.to_string(),
        })
    }
}

/// Equality filter on a single field
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub value: Value,
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, data: &Map<String, Value>) -> bool {
        data.get(&self.field) == Some(&self.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Desc,
        }
    }
}

/// Filter and ordering a cursor is bound to
#[derive(Debug, Clone, PartialEq)]
pub struct QueryScope {
    pub filters: Vec<Filter>,
    pub order_by: Option<OrderBy>,
}

/// Filtered, ordered and limited query against one collection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
    pub start_after: Option<Cursor>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by = Some(order);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn start_after(mut self, cursor: Cursor) -> Self {
        self.start_after = Some(cursor);
        self
    }

    pub fn scope(&self) -> QueryScope {
        QueryScope {
            filters: self.filters.clone(),
            order_by: self.order_by.clone(),
        }
    }
}

/// Opaque pagination handle pointing at the last document of a page.
///
/// Only valid for the query scope it was produced by.
#[derive(Debug, Clone, PartialEq)]
pub struct Cursor {
    scope: QueryScope,
    last_id: String,
    last_sort_value: Value,
}

impl Cursor {
    /// Cursor positioned after `doc` within `scope`
    pub fn after(scope: QueryScope, doc: &Document) -> Self {
        let last_sort_value = scope
            .order_by
            .as_ref()
            .and_then(|order| doc.data.get(&order.field).cloned())
            .unwrap_or(Value::Null);
        Self {
            scope,
            last_id: doc.id.clone(),
            last_sort_value,
        }
    }

    pub fn scope(&self) -> &QueryScope {
        &self.scope
    }

    pub fn last_id(&self) -> &str {
        &self.last_id
    }

    pub fn last_sort_value(&self) -> &Value {
        &self.last_sort_value
    }
}

/// One page of query results.
///
/// `cursor` points at the last returned document whenever the page is
/// non-empty, short pages included.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub documents: Vec<Document>,
    pub cursor: Option<Cursor>,
}

impl Page {
    pub fn new(scope: QueryScope, documents: Vec<Document>) -> Self {
        let cursor = documents.last().map(|doc| Cursor::after(scope, doc));
        Self { documents, cursor }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Progress report from a running upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadEvent {
    Progress { transferred: u64, total: u64 },
    Completed { url: String },
}

pub type UploadStream = BoxStream<'static, Result<UploadEvent, BlobError>>;

/// Identity reported by the authentication provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub uid: String,
    pub email: String,
    pub display_name: Option<String>,
}

/// Auth state changes, starting with the state at subscription time
pub type AuthStream = BoxStream<'static, Option<AuthUser>>;

/// Address resolved by a geocoder
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodedAddress {
    pub point: GeoPoint,
    pub formatted_address: String,
}
