use async_trait::async_trait;
use redis::{aio::Connection, AsyncCommands, Client};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use super::{check_owner_unchanged, check_required_fields, removed_epitopes};
use super::{TaskRepository, UserRepository};
use crate::config::StorageConfig;
use crate::errors::{StoreError, StoreResult};
use crate::models::{Epitope, EpitopeTaskData, TaskId, TaskStatus, User, UserId};

const ALL_TASKS: &str = "tasks";
const NEXT_TASK_ID: &str = "task:next_id";
const NEXT_EPITOPE_ID: &str = "epitope:next_id";
const NEXT_USER_ID: &str = "user:next_id";

fn task_key(id: TaskId) -> String {
    format!("task:{}", id)
}

// Hash of epitope id -> JSON record; deleting it cascades all results at once.
fn task_epitopes_key(id: TaskId) -> String {
    format!("task:{}:epitopes", id)
}

fn user_key(id: UserId) -> String {
    format!("user:{}", id)
}

fn user_tasks_key(id: UserId) -> String {
    format!("user:{}:tasks", id)
}

fn username_key(username: &str) -> String {
    format!("username:{}", username)
}

// Lifts a counter to at least ARGV[1], never lowering it.
const RAISE_COUNTER: &str = r"
local current = tonumber(redis.call('GET', KEYS[1]) or '0')
if current < tonumber(ARGV[1]) then
    redis.call('SET', KEYS[1], ARGV[1])
end
return current
";

/// Queues a counter raise inside a `MULTI`, so an explicit id is never handed
/// out again by a later insert.
fn raise_counter(pipe: &mut redis::Pipeline, counter: &str, id: i64) {
    pipe.cmd("EVAL")
        .arg(RAISE_COUNTER)
        .arg(1)
        .arg(counter)
        .arg(id)
        .ignore();
}

/// Redis-backed repository.
///
/// Writes use optimistic transactions: the keys a write depends on are
/// `WATCH`ed, checked, and then changed in one `MULTI`/`EXEC`. An aborted
/// `EXEC` applies nothing and is retried up to `max_retries` times.
/// Each write uses its own connection, so returning early drops the `WATCH`.
#[derive(Clone)]
pub struct RedisStore {
    client: Arc<Client>,
    max_retries: u32,
}

impl RedisStore {
    pub fn new(client: Arc<Client>, max_retries: u32) -> Self {
        Self {
            client,
            max_retries: max_retries.max(1),
        }
    }

    pub fn connect(config: &StorageConfig) -> StoreResult<Self> {
        let url = if config.sentinel_enabled {
            config.sentinel_url.as_deref().ok_or_else(|| {
                redis::RedisError::from((
                    redis::ErrorKind::InvalidClientConfig,
                    "Sentinel enabled but sentinel_url not configured",
                ))
            })?
        } else {
            config.url.as_str()
        };
        let client = Client::open(url)?;
        Ok(Self::new(Arc::new(client), config.max_retries))
    }

    async fn conn(&self) -> StoreResult<Connection> {
        Ok(self.client.get_async_connection().await?)
    }

    async fn watch(conn: &mut Connection, keys: &[String]) -> StoreResult<()> {
        redis::cmd("WATCH").arg(keys).query_async::<_, ()>(conn).await?;
        Ok(())
    }

    async fn load_task(conn: &mut Connection, id: TaskId) -> StoreResult<Option<EpitopeTaskData>> {
        // Row and results are read in one EXEC so a concurrent save is seen
        // entirely or not at all.
        let (row, results): (Option<String>, HashMap<i64, String>) = redis::pipe()
            .atomic()
            .get(task_key(id))
            .hgetall(task_epitopes_key(id))
            .query_async(conn)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut task: EpitopeTaskData = serde_json::from_str(&row)?;
        let mut results: Vec<(i64, String)> = results.into_iter().collect();
        results.sort_unstable_by_key(|(eid, _)| *eid);
        task.epitopes = results
            .iter()
            .map(|(_, json)| serde_json::from_str(json))
            .collect::<Result<Vec<Epitope>, _>>()?;
        Ok(Some(task))
    }

    async fn load_tasks(&self, set_key: &str) -> StoreResult<Vec<EpitopeTaskData>> {
        let mut conn = self.conn().await?;
        let mut ids: Vec<TaskId> = conn.smembers(set_key).await?;
        ids.sort_unstable();

        let mut tasks = Vec::with_capacity(ids.len());
        for id in ids {
            // A task deleted between SMEMBERS and the read is simply skipped.
            if let Some(task) = Self::load_task(&mut conn, id).await? {
                tasks.push(task);
            }
        }
        Ok(tasks)
    }

    async fn unwatch(conn: &mut Connection) -> StoreResult<()> {
        redis::cmd("UNWATCH").query_async::<_, ()>(conn).await?;
        Ok(())
    }

    /// Shared body of `save` and `update`. With `existing_only`, a task that
    /// is not stored yields `None` and nothing is written.
    async fn write_task(
        &self,
        mut task: EpitopeTaskData,
        existing_only: bool,
    ) -> StoreResult<Option<EpitopeTaskData>> {
        check_required_fields(&task)?;
        if existing_only && task.id.is_none() {
            return Ok(None);
        }
        let mut conn = self.conn().await?;

        // Drawn ids come from the counter; explicit ids raise it instead.
        let drawn = task.id.is_none();
        let mut id = match task.id {
            Some(id) => id,
            None => conn.incr(NEXT_TASK_ID, 1).await?,
        };

        for attempt in 1..=self.max_retries {
            task.id = Some(id);
            Self::watch(
                &mut conn,
                &[task_key(id), task_epitopes_key(id), user_key(task.user_id)],
            )
            .await?;

            let owner_exists: bool = conn.exists(user_key(task.user_id)).await?;
            if !owner_exists {
                return Err(StoreError::ConstraintViolation(format!(
                    "owner {} does not exist",
                    task.user_id
                )));
            }

            let stored_row: Option<String> = conn.get(task_key(id)).await?;
            match (&stored_row, existing_only, drawn) {
                (None, true, _) => return Ok(None),
                (Some(_), _, true) => {
                    // Taken by an explicit-id insert; draw again.
                    Self::unwatch(&mut conn).await?;
                    tracing::debug!("Task id {} already in use, drawing a new one", id);
                    id = conn.incr(NEXT_TASK_ID, 1).await?;
                    continue;
                }
                _ => {}
            }
            let stored = stored_row
                .map(|row| serde_json::from_str::<EpitopeTaskData>(&row))
                .transpose()?;
            check_owner_unchanged(stored.as_ref(), &task)?;

            let stored_ids: Vec<i64> = conn.hkeys(task_epitopes_key(id)).await?;
            let stored_ids: HashSet<i64> = stored_ids.into_iter().collect();
            let removed = removed_epitopes(&stored_ids, &task.epitopes)?;

            let mut epitopes = task.epitopes.clone();
            for epitope in epitopes.iter_mut().filter(|e| e.id.is_none()) {
                epitope.id = Some(conn.incr(NEXT_EPITOPE_ID, 1).await?);
            }
            let mut fields = Vec::with_capacity(epitopes.len());
            for epitope in &epitopes {
                if let Some(eid) = epitope.id {
                    fields.push((eid, serde_json::to_string(epitope)?));
                }
            }

            let mut pipe = redis::pipe();
            pipe.atomic()
                .set(task_key(id), serde_json::to_string(&task.row())?)
                .ignore()
                .sadd(ALL_TASKS, id)
                .ignore()
                .sadd(user_tasks_key(task.user_id), id)
                .ignore();
            if !drawn {
                raise_counter(&mut pipe, NEXT_TASK_ID, id);
            }
            if !removed.is_empty() {
                pipe.hdel(task_epitopes_key(id), &removed).ignore();
            }
            if !fields.is_empty() {
                pipe.hset_multiple(task_epitopes_key(id), &fields).ignore();
            }

            let committed: Option<()> = pipe.query_async(&mut conn).await?;
            if committed.is_some() {
                if !removed.is_empty() {
                    tracing::debug!("Removed {} orphaned epitope(s) from task {}", removed.len(), id);
                }
                epitopes.sort_unstable_by_key(|e| e.id);
                task.epitopes = epitopes;
                return Ok(Some(task));
            }
            tracing::debug!(
                "Save of task {} aborted by a concurrent write (attempt {}/{})",
                id,
                attempt,
                self.max_retries
            );
        }

        Err(StoreError::TransactionFailure(self.max_retries))
    }
}

#[async_trait]
impl TaskRepository for RedisStore {
    async fn save(&self, task: EpitopeTaskData) -> StoreResult<EpitopeTaskData> {
        let task_id = task.id;
        let saved = self.write_task(task, false).await?;
        saved.ok_or_else(|| StoreError::ConstraintViolation(format!("task {:?} was not written", task_id)))
    }

    async fn update(&self, task: EpitopeTaskData) -> StoreResult<Option<EpitopeTaskData>> {
        self.write_task(task, true).await
    }

    async fn find_all(&self) -> StoreResult<Vec<EpitopeTaskData>> {
        self.load_tasks(ALL_TASKS).await
    }

    async fn find_by_id(&self, id: TaskId) -> StoreResult<Option<EpitopeTaskData>> {
        let mut conn = self.conn().await?;
        Self::load_task(&mut conn, id).await
    }

    async fn find_tasks_by_user_id(&self, user_id: UserId) -> StoreResult<Vec<EpitopeTaskData>> {
        self.load_tasks(&user_tasks_key(user_id)).await
    }

    async fn find_by_user_id_and_status(
        &self,
        user_id: UserId,
        status: TaskStatus,
    ) -> StoreResult<Vec<EpitopeTaskData>> {
        let tasks = self.find_tasks_by_user_id(user_id).await?;
        Ok(tasks.into_iter().filter(|t| t.status == status).collect())
    }

    async fn delete_by_id(&self, id: TaskId) -> StoreResult<bool> {
        let mut conn = self.conn().await?;

        for attempt in 1..=self.max_retries {
            Self::watch(&mut conn, &[task_key(id), task_epitopes_key(id)]).await?;

            let row: Option<String> = conn.get(task_key(id)).await?;
            let Some(row) = row else {
                return Ok(false);
            };
            let stored: EpitopeTaskData = serde_json::from_str(&row)?;

            let committed: Option<()> = redis::pipe()
                .atomic()
                .del(task_key(id))
                .ignore()
                .del(task_epitopes_key(id))
                .ignore()
                .srem(ALL_TASKS, id)
                .ignore()
                .srem(user_tasks_key(stored.user_id), id)
                .ignore()
                .query_async(&mut conn)
                .await?;
            if committed.is_some() {
                return Ok(true);
            }
            tracing::debug!(
                "Delete of task {} aborted by a concurrent write (attempt {}/{})",
                id,
                attempt,
                self.max_retries
            );
        }

        Err(StoreError::TransactionFailure(self.max_retries))
    }
}

#[async_trait]
impl UserRepository for RedisStore {
    async fn save_user(&self, mut user: User) -> StoreResult<User> {
        let mut conn = self.conn().await?;

        let drawn = user.id.is_none();
        let mut id = match user.id {
            Some(id) => id,
            None => conn.incr(NEXT_USER_ID, 1).await?,
        };

        for _ in 0..self.max_retries {
            user.id = Some(id);
            Self::watch(&mut conn, &[user_key(id), username_key(&user.username)]).await?;

            let holder: Option<UserId> = conn.get(username_key(&user.username)).await?;
            if holder.is_some_and(|holder| holder != id) {
                return Err(StoreError::ConstraintViolation(format!(
                    "username {} is already taken",
                    user.username
                )));
            }

            let previous: Option<String> = conn.get(user_key(id)).await?;
            if drawn && previous.is_some() {
                Self::unwatch(&mut conn).await?;
                id = conn.incr(NEXT_USER_ID, 1).await?;
                continue;
            }
            let previous = previous
                .map(|json| serde_json::from_str::<User>(&json))
                .transpose()?;

            let mut pipe = redis::pipe();
            pipe.atomic();
            if let Some(previous) = previous.filter(|p| p.username != user.username) {
                pipe.del(username_key(&previous.username)).ignore();
            }
            pipe.set(user_key(id), serde_json::to_string(&user)?)
                .ignore()
                .set(username_key(&user.username), id)
                .ignore();
            if !drawn {
                raise_counter(&mut pipe, NEXT_USER_ID, id);
            }

            let committed: Option<()> = pipe.query_async(&mut conn).await?;
            if committed.is_some() {
                return Ok(user);
            }
        }

        Err(StoreError::TransactionFailure(self.max_retries))
    }

    async fn find_user_by_id(&self, id: UserId) -> StoreResult<Option<User>> {
        let mut conn = self.conn().await?;
        let user_data: Option<String> = conn.get(user_key(id)).await?;
        Ok(user_data.map(|data| serde_json::from_str(&data)).transpose()?)
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let mut conn = self.conn().await?;
        let id: Option<UserId> = conn.get(username_key(username)).await?;
        match id {
            Some(id) => self.find_user_by_id(id).await,
            None => Ok(None),
        }
    }

    async fn delete_user(&self, id: UserId) -> StoreResult<bool> {
        let mut conn = self.conn().await?;

        for _ in 0..self.max_retries {
            Self::watch(&mut conn, &[user_key(id), user_tasks_key(id)]).await?;

            let user_data: Option<String> = conn.get(user_key(id)).await?;
            let Some(user_data) = user_data else {
                return Ok(false);
            };
            let user: User = serde_json::from_str(&user_data)?;

            let owned: usize = conn.scard(user_tasks_key(id)).await?;
            if owned > 0 {
                return Err(StoreError::ConstraintViolation(format!(
                    "user {} still owns {} task(s)",
                    id, owned
                )));
            }

            let committed: Option<()> = redis::pipe()
                .atomic()
                .del(user_key(id))
                .ignore()
                .del(username_key(&user.username))
                .ignore()
                .query_async(&mut conn)
                .await?;
            if committed.is_some() {
                return Ok(true);
            }
        }

        Err(StoreError::TransactionFailure(self.max_retries))
    }
}
