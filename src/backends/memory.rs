//! In-process driver
//!
//! [`MemoryDriver`] answers every [`Driver`] entry point from an in-memory model of a
//! server: existing databases, attachments, transactions, statements, blobs and queued
//! event waits. Server facts are configurable, any entry point can be made to fail, and
//! every call is counted.

use crate::core::attributes::DPB_USER_NAME;
use crate::core::driver::{calls, Driver, RawHandle, MIN_CLIENT_VERSION};
use crate::core::info::*;
use crate::core::status::Status;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Network or I/O failure (injected)
const GDS_NETWORK_ERROR: i64 = 335544721;
const GDS_IO_ERROR: i64 = 335544344;
const GDS_BAD_DB_HANDLE: i64 = 335544324;
const GDS_BAD_TRANS_HANDLE: i64 = 335544332;
const GDS_BAD_STMT_HANDLE: i64 = 335544485;
const GDS_BAD_SEGSTR_HANDLE: i64 = 335544328;
const GDS_BAD_EVENT: i64 = 335544468;
const GDS_DSQL_ERROR: i64 = 335544569;

struct ServerState {
    databases: HashSet<String>,
    attachments: HashMap<RawHandle, Attachment>,
    transactions: HashMap<RawHandle, RawHandle>,
    statements: HashMap<RawHandle, RawHandle>,
    /// Open blob handle -> (owning attachment, blob id)
    blobs: HashMap<RawHandle, (RawHandle, u64)>,
    stored_blobs: HashSet<u64>,
    events: HashMap<i32, RawHandle>,
    next_handle: u32,
    next_blob_id: u64,
    ods_major: i32,
    ods_minor: i32,
    dialect: i32,
    client_version: i32,
    page_size: i32,
    users: Vec<String>,
    statistics: DatabaseStatistics,
    table_counts: BTreeMap<u16, DatabaseCounts>,
    failures: HashSet<&'static str>,
    calls: HashMap<&'static str, usize>,
    call_log: Vec<&'static str>,
}

struct Attachment {
    path: String,
    user: String,
}

impl ServerState {
    fn new_handle(&mut self) -> RawHandle {
        self.next_handle += 1;
        RawHandle(self.next_handle)
    }

    // Count the call and report an injected failure, if any.
    fn enter(&mut self, call: &'static str, status: &mut Status) -> bool {
        *self.calls.entry(call).or_insert(0) += 1;
        self.call_log.push(call);
        if self.failures.contains(call) {
            status.set_error(
                GDS_NETWORK_ERROR,
                -902,
                format!("Unable to complete network request ({})", call),
            );
            return false;
        }
        true
    }

    fn check_db(&self, db: RawHandle, status: &mut Status) -> bool {
        if self.attachments.contains_key(&db) {
            return true;
        }
        status.set_error(GDS_BAD_DB_HANDLE, -904, "invalid database handle (no active connection)");
        false
    }

    /// Remove an attachment and everything opened through it; returns its path
    fn release_attachment(&mut self, db: RawHandle) -> Option<String> {
        self.transactions.retain(|_, owner| *owner != db);
        self.statements.retain(|_, owner| *owner != db);
        self.blobs.retain(|_, (owner, _)| *owner != db);
        self.events.retain(|_, owner| *owner != db);
        self.attachments.remove(&db).map(|attachment| attachment.path)
    }

    fn info_response(&self, items: &[u8]) -> InfoBuilder {
        let mut response = InfoBuilder::new();
        for &item in items {
            response = match item {
                INFO_END => break,
                INFO_ODS_VERSION => response.int(item, self.ods_major),
                INFO_ODS_MINOR_VERSION => response.int(item, self.ods_minor),
                INFO_DB_SQL_DIALECT => response.int(item, self.dialect),
                INFO_PAGE_SIZE => response.int(item, self.page_size),
                INFO_ALLOCATION => response.int(item, 256),
                INFO_NUM_BUFFERS => response.int(item, 2048),
                INFO_SWEEP_INTERVAL => response.int(item, 20000),
                INFO_FORCED_WRITES => response.int(item, 1),
                INFO_NO_RESERVE => response.int(item, 0),
                INFO_DB_READ_ONLY => response.int(item, 0),
                INFO_FETCHES => response.int(item, self.statistics.fetches),
                INFO_MARKS => response.int(item, self.statistics.marks),
                INFO_READS => response.int(item, self.statistics.reads),
                INFO_WRITES => response.int(item, self.statistics.writes),
                INFO_INSERT_COUNT => response.counts(item, &self.per_table(|c| c.inserts)),
                INFO_UPDATE_COUNT => response.counts(item, &self.per_table(|c| c.updates)),
                INFO_DELETE_COUNT => response.counts(item, &self.per_table(|c| c.deletes)),
                INFO_READ_IDX_COUNT => {
                    response.counts(item, &self.per_table(|c| c.indexed_reads))
                }
                INFO_READ_SEQ_COUNT => {
                    response.counts(item, &self.per_table(|c| c.sequential_reads))
                }
                INFO_USER_NAMES => self
                    .users
                    .iter()
                    .fold(response, |response, user| response.user(user)),
                _ => response,
            };
        }
        response.end()
    }

    fn per_table(&self, field: fn(&DatabaseCounts) -> i32) -> Vec<(u16, u32)> {
        self.table_counts
            .iter()
            .map(|(table, counts)| (*table, field(counts) as u32))
            .filter(|(_, count)| *count != 0)
            .collect()
    }
}

/// Driver backed by an in-memory server model
///
/// Defaults: ODS 12.0, dialect 3, client version 60, page size 8192, no users.
pub struct MemoryDriver {
    state: Mutex<ServerState>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ServerState {
                databases: HashSet::new(),
                attachments: HashMap::new(),
                transactions: HashMap::new(),
                statements: HashMap::new(),
                blobs: HashMap::new(),
                stored_blobs: HashSet::new(),
                events: HashMap::new(),
                next_handle: 0,
                next_blob_id: 0,
                ods_major: 12,
                ods_minor: 0,
                dialect: 3,
                client_version: MIN_CLIENT_VERSION,
                page_size: 8192,
                users: Vec::new(),
                statistics: DatabaseStatistics::default(),
                table_counts: BTreeMap::new(),
                failures: HashSet::new(),
                calls: HashMap::new(),
                call_log: Vec::new(),
            }),
        }
    }

    /// Make `path` an existing database
    pub fn add_database(&self, path: impl Into<String>) {
        self.state.lock().databases.insert(path.into());
    }

    pub fn database_exists(&self, path: &str) -> bool {
        self.state.lock().databases.contains(path)
    }

    pub fn set_ods_version(&self, major: i32, minor: i32) {
        let mut state = self.state.lock();
        state.ods_major = major;
        state.ods_minor = minor;
    }

    pub fn set_dialect(&self, dialect: i32) {
        self.state.lock().dialect = dialect;
    }

    pub fn set_client_version(&self, version: i32) {
        self.state.lock().client_version = version;
    }

    /// User names answered to the attached-users query
    pub fn set_users(&self, users: Vec<String>) {
        self.state.lock().users = users;
    }

    pub fn set_statistics(&self, statistics: DatabaseStatistics) {
        self.state.lock().statistics = statistics;
    }

    /// Row counts reported for table `table_id`
    pub fn set_table_counts(&self, table_id: u16, counts: DatabaseCounts) {
        self.state.lock().table_counts.insert(table_id, counts);
    }

    /// Make every subsequent call to `call` fail
    pub fn fail_on(&self, call: &'static str) {
        self.state.lock().failures.insert(call);
    }

    /// Stop failing `call`
    pub fn recover(&self, call: &'static str) {
        self.state.lock().failures.remove(call);
    }

    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    /// Number of times `call` was invoked, failed calls included
    pub fn call_count(&self, call: &str) -> usize {
        self.state.lock().calls.get(call).copied().unwrap_or(0)
    }

    /// Every entry point invoked so far, in call order
    pub fn call_sequence(&self) -> Vec<&'static str> {
        self.state.lock().call_log.clone()
    }

    pub fn open_attachments(&self) -> usize {
        self.state.lock().attachments.len()
    }

    /// User names of the open attachments
    pub fn attached_users(&self) -> Vec<String> {
        let state = self.state.lock();
        let mut users: Vec<_> = state.attachments.values().map(|a| a.user.clone()).collect();
        users.sort();
        users
    }

    pub fn open_transactions(&self) -> usize {
        self.state.lock().transactions.len()
    }

    pub fn open_statements(&self) -> usize {
        self.state.lock().statements.len()
    }

    pub fn open_blobs(&self) -> usize {
        self.state.lock().blobs.len()
    }

    pub fn queued_events(&self) -> usize {
        self.state.lock().events.len()
    }
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

// Path of a `CREATE DATABASE "path" ...` statement, with `\"` unescaped.
fn created_path(sql: &str) -> Option<String> {
    let rest = sql.trim_start().strip_prefix("CREATE DATABASE \"")?;
    let mut path = String::new();
    let mut chars = rest.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => path.push(chars.next()?),
            '"' => return Some(path),
            _ => path.push(c),
        }
    }
    None
}

// User name carried by a raw DPB; empty when absent or malformed.
fn dpb_user(dpb: &[u8]) -> String {
    let mut pos = 1;
    while let (Some(&tag), Some(&len)) = (dpb.get(pos), dpb.get(pos + 1)) {
        let start = pos + 2;
        let Some(value) = dpb.get(start..start + len as usize) else {
            break;
        };
        if tag == DPB_USER_NAME {
            return String::from_utf8_lossy(value).into_owned();
        }
        pos = start + len as usize;
    }
    String::new()
}

impl Driver for MemoryDriver {
    fn client_version(&self) -> i32 {
        self.state.lock().client_version
    }

    fn attach_database(&self, status: &mut Status, path: &str, db: &mut RawHandle, dpb: &[u8]) {
        let mut state = self.state.lock();
        if !state.enter(calls::ATTACH_DATABASE, status) {
            return;
        }
        if !state.databases.contains(path) {
            status.set_error(
                GDS_IO_ERROR,
                -902,
                format!("I/O error during \"open\" operation for file \"{}\"", path),
            );
            return;
        }
        let handle = state.new_handle();
        state.attachments.insert(
            handle,
            Attachment {
                path: path.to_string(),
                user: dpb_user(dpb),
            },
        );
        *db = handle;
    }

    fn detach_database(&self, status: &mut Status, db: &mut RawHandle) {
        let mut state = self.state.lock();
        if !state.enter(calls::DETACH_DATABASE, status) || !state.check_db(*db, status) {
            return;
        }
        state.release_attachment(*db);
        *db = RawHandle::NULL;
    }

    fn drop_database(&self, status: &mut Status, db: &mut RawHandle) {
        let mut state = self.state.lock();
        if !state.enter(calls::DROP_DATABASE, status) || !state.check_db(*db, status) {
            return;
        }
        if let Some(path) = state.release_attachment(*db) {
            state.databases.remove(&path);
        }
        *db = RawHandle::NULL;
    }

    fn execute_immediate(
        &self,
        status: &mut Status,
        db: &mut RawHandle,
        _tr: &mut RawHandle,
        sql: &str,
        dialect: u16,
    ) {
        let mut state = self.state.lock();
        if !state.enter(calls::EXECUTE_IMMEDIATE, status) {
            return;
        }
        if dialect != 1 && dialect != 3 {
            status.set_error(GDS_DSQL_ERROR, -104, format!("invalid SQL dialect {}", dialect));
            return;
        }
        let Some(path) = created_path(sql) else {
            status.set_error(GDS_DSQL_ERROR, -104, "Dynamic SQL Error: only CREATE DATABASE is supported");
            return;
        };
        if state.databases.contains(&path) {
            status.set_error(GDS_IO_ERROR, -902, format!("database {} already exists", path));
            return;
        }
        state.databases.insert(path.clone());
        let handle = state.new_handle();
        state.attachments.insert(
            handle,
            Attachment {
                path,
                user: String::new(),
            },
        );
        *db = handle;
    }

    fn database_info(&self, status: &mut Status, db: RawHandle, items: &[u8], buffer: &mut [u8]) {
        let mut state = self.state.lock();
        if !state.enter(calls::DATABASE_INFO, status) || !state.check_db(db, status) {
            return;
        }
        state.info_response(items).write_into(buffer);
    }

    fn start_transaction(&self, status: &mut Status, tr: &mut RawHandle, db: RawHandle) {
        let mut state = self.state.lock();
        if !state.enter(calls::START_TRANSACTION, status) || !state.check_db(db, status) {
            return;
        }
        let handle = state.new_handle();
        state.transactions.insert(handle, db);
        *tr = handle;
    }

    fn commit_transaction(&self, status: &mut Status, tr: &mut RawHandle) {
        self.end_transaction(calls::COMMIT_TRANSACTION, status, tr);
    }

    fn rollback_transaction(&self, status: &mut Status, tr: &mut RawHandle) {
        self.end_transaction(calls::ROLLBACK_TRANSACTION, status, tr);
    }

    fn allocate_statement(&self, status: &mut Status, db: RawHandle, stmt: &mut RawHandle) {
        let mut state = self.state.lock();
        if !state.enter(calls::ALLOCATE_STATEMENT, status) || !state.check_db(db, status) {
            return;
        }
        let handle = state.new_handle();
        state.statements.insert(handle, db);
        *stmt = handle;
    }

    fn free_statement(&self, status: &mut Status, stmt: &mut RawHandle) {
        let mut state = self.state.lock();
        if !state.enter(calls::FREE_STATEMENT, status) {
            return;
        }
        if state.statements.remove(&*stmt).is_none() {
            status.set_error(GDS_BAD_STMT_HANDLE, -901, "invalid statement handle");
            return;
        }
        *stmt = RawHandle::NULL;
    }

    fn create_blob(
        &self,
        status: &mut Status,
        db: RawHandle,
        tr: RawHandle,
        blob: &mut RawHandle,
        blob_id: &mut u64,
    ) {
        let mut state = self.state.lock();
        if !state.enter(calls::CREATE_BLOB, status)
            || !state.check_db(db, status)
            || !Self::check_tr(&state, tr, status)
        {
            return;
        }
        state.next_blob_id += 1;
        let id = state.next_blob_id;
        let handle = state.new_handle();
        state.blobs.insert(handle, (db, id));
        state.stored_blobs.insert(id);
        *blob = handle;
        *blob_id = id;
    }

    fn open_blob(
        &self,
        status: &mut Status,
        db: RawHandle,
        tr: RawHandle,
        blob: &mut RawHandle,
        blob_id: u64,
    ) {
        let mut state = self.state.lock();
        if !state.enter(calls::OPEN_BLOB, status)
            || !state.check_db(db, status)
            || !Self::check_tr(&state, tr, status)
        {
            return;
        }
        if !state.stored_blobs.contains(&blob_id) {
            status.set_error(GDS_BAD_SEGSTR_HANDLE, -904, format!("blob {} not found", blob_id));
            return;
        }
        let handle = state.new_handle();
        state.blobs.insert(handle, (db, blob_id));
        *blob = handle;
    }

    fn close_blob(&self, status: &mut Status, blob: &mut RawHandle) {
        self.end_blob(calls::CLOSE_BLOB, status, blob, false);
    }

    fn cancel_blob(&self, status: &mut Status, blob: &mut RawHandle) {
        self.end_blob(calls::CANCEL_BLOB, status, blob, true);
    }

    fn queue_events(&self, status: &mut Status, db: RawHandle, event_id: &mut i32, names: &[String]) {
        let mut state = self.state.lock();
        if !state.enter(calls::QUEUE_EVENTS, status) || !state.check_db(db, status) {
            return;
        }
        if names.is_empty() {
            status.set_error(GDS_BAD_EVENT, -901, "no event names given");
            return;
        }
        let id = state.new_handle().0 as i32;
        state.events.insert(id, db);
        *event_id = id;
    }

    fn cancel_events(&self, status: &mut Status, _db: RawHandle, event_id: &mut i32) {
        let mut state = self.state.lock();
        if !state.enter(calls::CANCEL_EVENTS, status) {
            return;
        }
        if state.events.remove(&*event_id).is_none() {
            status.set_error(GDS_BAD_EVENT, -901, format!("invalid event id {}", event_id));
            return;
        }
        *event_id = 0;
    }
}

impl MemoryDriver {
    fn check_tr(state: &ServerState, tr: RawHandle, status: &mut Status) -> bool {
        if state.transactions.contains_key(&tr) {
            return true;
        }
        status.set_error(GDS_BAD_TRANS_HANDLE, -901, "invalid transaction handle");
        false
    }

    fn end_transaction(&self, call: &'static str, status: &mut Status, tr: &mut RawHandle) {
        let mut state = self.state.lock();
        if !state.enter(call, status) || !Self::check_tr(&state, *tr, status) {
            return;
        }
        state.transactions.remove(&*tr);
        *tr = RawHandle::NULL;
    }

    fn end_blob(&self, call: &'static str, status: &mut Status, blob: &mut RawHandle, discard: bool) {
        let mut state = self.state.lock();
        if !state.enter(call, status) {
            return;
        }
        let Some((_, id)) = state.blobs.remove(&*blob) else {
            status.set_error(GDS_BAD_SEGSTR_HANDLE, -901, "invalid BLOB handle");
            return;
        };
        if discard {
            state.stored_blobs.remove(&id);
        }
        *blob = RawHandle::NULL;
    }
}
