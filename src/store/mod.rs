// src/store/mod.rs
// SQLite persistence, one operations struct per concern

pub mod executions;
pub mod messages;
pub mod migrations;
pub mod templates;
pub mod threads;
pub mod users;

use anyhow::Result;
use sqlx::SqlitePool;
use uuid::Uuid;

pub use executions::{
    ExecutionFilter, ExecutionStatus, ExecutionStore, ExecutionUpdate, NewExecution,
    ThreadExecution,
};
pub use messages::{Message, MessageStore, MessageUpdate, NewMessage};
pub use templates::{ExecutionParams, ExecutionTemplate, TemplateStore, TemplateUpdate};
pub use threads::{Thread, ThreadStore};
pub use users::{User, UserStore};

/// Sentinel thread identifier used when an execution runs without a
/// persisted conversation. The row is created at migration time.
pub const NULL_THREAD_ID: &str = "thread_null";

pub(crate) const THREAD_ID_PREFIX: &str = "thread_";
pub(crate) const MESSAGE_ID_PREFIX: &str = "msg_";
pub(crate) const EXECUTION_ID_PREFIX: &str = "exec_";
pub(crate) const TEMPLATE_ID_PREFIX: &str = "tmpl_";
pub(crate) const PARAMS_ID_PREFIX: &str = "params_";

pub(crate) fn new_identifier(prefix: &str) -> String {
    format!("{}{}", prefix, Uuid::new_v4())
}

/// Facade over the per-concern stores, sharing one pool.
#[derive(Clone)]
pub struct Store {
    pub users: UserStore,
    pub threads: ThreadStore,
    pub messages: MessageStore,
    pub templates: TemplateStore,
    pub executions: ExecutionStore,
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            users: UserStore::new(pool.clone()),
            threads: ThreadStore::new(pool.clone()),
            messages: MessageStore::new(pool.clone()),
            templates: TemplateStore::new(pool.clone()),
            executions: ExecutionStore::new(pool.clone()),
            pool,
        }
    }

    pub async fn run_migrations(&self) -> Result<()> {
        migrations::run_migrations(&self.pool).await
    }
}
