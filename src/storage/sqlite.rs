//! SQLite implementation of every collaborator store

use super::database::Database;
use crate::abuse_log::AbuseLogEntry;
use crate::error::{AbuseFilterError, Result};
use crate::expiry::Expiry;
use crate::filter::{ActionMap, Filter, FilterKey};
use crate::parameters::UserIdentity;
use crate::stores::*;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

fn millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

/// One group membership change, as recorded in the rights log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupChange {
    pub user: UserIdentity,
    pub group: String,
    pub added: bool,
    pub performer: UserIdentity,
    pub timestamp: DateTime<Utc>,
}

pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Group changes made to a user, oldest first
    pub fn group_changes(&self, user: &UserIdentity) -> Result<Vec<GroupChange>> {
        let conn = self.db.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT user_id, user_name, group_name, change, performer_id, performer_name, timestamp
             FROM rights_log WHERE user_id = ?1 ORDER BY id",
        )?;
        let changes = stmt
            .query_map(params![user.id as i64], |row| {
                Ok(GroupChange {
                    user: UserIdentity::new(row.get::<_, i64>(0)? as u64, row.get::<_, String>(1)?),
                    group: row.get(2)?,
                    added: row.get::<_, String>(3)? == "added",
                    performer: UserIdentity::new(
                        row.get::<_, i64>(4)? as u64,
                        row.get::<_, String>(5)?,
                    ),
                    timestamp: from_millis(row.get(6)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(changes)
    }

    /// Every stored filter, by key
    pub fn filters(&self) -> Result<Vec<Filter>> {
        let conn = self.db.get_conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {} FROM filters", FILTER_COLUMNS))?;
        let rows = stmt
            .query_map([], FilterRow::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let mut filters = rows
            .into_iter()
            .map(FilterRow::into_filter)
            .collect::<Result<Vec<_>>>()?;
        filters.sort_by_key(|f| f.key);
        Ok(filters)
    }

    fn change_group(
        &self,
        user: &UserIdentity,
        group: &str,
        performer: &UserIdentity,
        added: bool,
    ) -> Result<bool> {
        let mut conn = self.db.get_conn()?;
        let tx = conn.transaction()?;
        let sql = if added {
            "INSERT OR IGNORE INTO user_groups (user_id, group_name) VALUES (?1, ?2)"
        } else {
            "DELETE FROM user_groups WHERE user_id = ?1 AND group_name = ?2"
        };
        let changed = tx.execute(sql, params![user.id as i64, group])? > 0;

        if changed {
            tx.execute(
                "INSERT INTO rights_log
                    (user_id, user_name, group_name, change, performer_id, performer_name, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    user.id as i64,
                    user.name,
                    group,
                    if added { "added" } else { "removed" },
                    performer.id as i64,
                    performer.name,
                    millis(Utc::now()),
                ],
            )?;
        }
        tx.commit()?;
        Ok(changed)
    }
}

const FILTER_COLUMNS: &str =
    "key, name, pattern, enabled, deleted, hidden, throttled, actions, hit_count";

struct FilterRow {
    key: String,
    name: String,
    pattern: String,
    enabled: bool,
    deleted: bool,
    hidden: bool,
    throttled: bool,
    actions: String,
    hit_count: i64,
}

impl FilterRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            key: row.get(0)?,
            name: row.get(1)?,
            pattern: row.get(2)?,
            enabled: row.get(3)?,
            deleted: row.get(4)?,
            hidden: row.get(5)?,
            throttled: row.get(6)?,
            actions: row.get(7)?,
            hit_count: row.get(8)?,
        })
    }

    fn into_filter(self) -> Result<Filter> {
        let actions: ActionMap =
            serde_json::from_str(&self.actions).map_err(|e| AbuseFilterError::Json {
                source: e,
                context: format!("Corrupt actions for filter {}", self.key),
            })?;
        Ok(Filter {
            key: self.key.parse()?,
            name: self.name,
            pattern: self.pattern,
            enabled: self.enabled,
            deleted: self.deleted,
            hidden: self.hidden,
            actions,
            hit_count: self.hit_count as u64,
            throttled: self.throttled,
        })
    }
}

impl FilterStore for SqliteStore {
    fn filter(&self, key: &FilterKey) -> Result<Option<Filter>> {
        let conn = self.db.get_conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM filters WHERE key = ?1", FILTER_COLUMNS),
                params![key.to_string()],
                FilterRow::from_row,
            )
            .optional()?;
        row.map(FilterRow::into_filter).transpose()
    }

    fn save_filter(&self, filter: &Filter) -> Result<()> {
        let actions = serde_json::to_string(&filter.actions).map_err(|e| AbuseFilterError::Json {
            source: e,
            context: format!("Failed to serialize actions for filter {}", filter.key),
        })?;
        let conn = self.db.get_conn()?;
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO filters ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                FILTER_COLUMNS
            ),
            params![
                filter.key.to_string(),
                filter.name,
                filter.pattern,
                filter.enabled,
                filter.deleted,
                filter.hidden,
                filter.throttled,
                actions,
                filter.hit_count as i64,
            ],
        )?;
        Ok(())
    }

    fn increment_hit_count(&self, key: &FilterKey) -> Result<()> {
        let conn = self.db.get_conn()?;
        let updated = conn.execute(
            "UPDATE filters SET hit_count = hit_count + 1 WHERE key = ?1",
            params![key.to_string()],
        )?;
        if updated == 0 {
            return Err(AbuseFilterError::FilterNotFound {
                key: key.to_string(),
            });
        }
        Ok(())
    }
}

impl UserStore for SqliteStore {
    fn find_or_create_system_user(&self, name: &str) -> Result<UserIdentity> {
        let conn = self.db.get_conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO users (name, created_at) VALUES (?1, datetime('now'))",
            params![name],
        )?;
        let id: i64 = conn.query_row(
            "SELECT id FROM users WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(UserIdentity::new(id as u64, name))
    }
}

impl GroupStore for SqliteStore {
    fn user_groups(&self, user: &UserIdentity) -> Result<Vec<String>> {
        let conn = self.db.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT group_name FROM user_groups WHERE user_id = ?1 ORDER BY group_name",
        )?;
        let groups = stmt
            .query_map(params![user.id as i64], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(groups)
    }

    fn add_user_to_group(
        &self,
        user: &UserIdentity,
        group: &str,
        performer: &UserIdentity,
    ) -> Result<bool> {
        self.change_group(user, group, performer, true)
    }

    fn remove_user_from_group(
        &self,
        user: &UserIdentity,
        group: &str,
        performer: &UserIdentity,
    ) -> Result<bool> {
        self.change_group(user, group, performer, false)
    }
}

/// Latest unremoved block on `target`, unless it has expired by `now`
fn select_active_block(
    conn: &Connection,
    target: &BlockTarget,
    now: DateTime<Utc>,
) -> Result<Option<BlockRecord>> {
    let row = conn
        .query_row(
            "SELECT id, target, performer_id, performer_name, reason, expiry,
                    prevent_talk_edit, created_at
             FROM blocks WHERE target = ?1 AND removed_at IS NULL
             ORDER BY id DESC LIMIT 1",
            params![target.to_string()],
            |row| {
                Ok(BlockRow {
                    id: row.get(0)?,
                    target: row.get(1)?,
                    performer_id: row.get(2)?,
                    performer_name: row.get(3)?,
                    reason: row.get(4)?,
                    expiry: row.get(5)?,
                    prevent_talk_edit: row.get(6)?,
                    created_at: row.get(7)?,
                })
            },
        )
        .optional()?;

    let Some(row) = row else {
        return Ok(None);
    };
    let record = row.into_record()?;
    if record.expiry.has_passed(now) {
        return Ok(None);
    }
    Ok(Some(record))
}

struct BlockRow {
    id: i64,
    target: String,
    performer_id: i64,
    performer_name: String,
    reason: String,
    expiry: String,
    prevent_talk_edit: bool,
    created_at: i64,
}

impl BlockRow {
    fn into_record(self) -> Result<BlockRecord> {
        Ok(BlockRecord {
            id: self.id,
            target: self.target.parse()?,
            performer: UserIdentity::new(self.performer_id as u64, self.performer_name),
            reason: self.reason,
            expiry: Expiry::from_db_string(&self.expiry)?,
            prevent_talk_edit: self.prevent_talk_edit,
            created_at: from_millis(self.created_at),
        })
    }
}

impl BlockStore for SqliteStore {
    fn place_block(&self, request: &BlockRequest) -> Result<BlockPlacement> {
        let now = Utc::now();
        let target = request.target.to_string();
        let mut conn = self.db.get_conn()?;
        let tx = conn.transaction()?;

        if let Some(active) = select_active_block(&tx, &request.target, now)? {
            if active.expiry > request.expiry {
                tracing::debug!(
                    "Keeping block #{} on {}: it outlasts the new request",
                    active.id,
                    target
                );
                return Ok(BlockPlacement::Kept(active));
            }
        }

        tx.execute(
            "UPDATE blocks SET removed_at = ?1, removed_by = ?2, remove_reason = 'Superseded'
             WHERE target = ?3 AND removed_at IS NULL",
            params![millis(now), request.performer.name, target],
        )?;
        tx.execute(
            "INSERT INTO blocks
                (target, performer_id, performer_name, reason, expiry, prevent_talk_edit, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                target,
                request.performer.id as i64,
                request.performer.name,
                request.reason,
                request.expiry.to_db_string(),
                request.prevent_talk_edit,
                millis(now),
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(BlockPlacement::Placed(BlockRecord {
            id,
            target: request.target.clone(),
            performer: request.performer.clone(),
            reason: request.reason.clone(),
            expiry: request.expiry,
            prevent_talk_edit: request.prevent_talk_edit,
            created_at: from_millis(millis(now)),
        }))
    }

    fn active_block(&self, target: &BlockTarget) -> Result<Option<BlockRecord>> {
        let conn = self.db.get_conn()?;
        select_active_block(&conn, target, Utc::now())
    }

    fn remove_block(
        &self,
        target: &BlockTarget,
        performer: &UserIdentity,
        reason: &str,
    ) -> Result<bool> {
        let Some(active) = self.active_block(target)? else {
            return Ok(false);
        };
        let conn = self.db.get_conn()?;
        let removed = conn.execute(
            "UPDATE blocks SET removed_at = ?1, removed_by = ?2, remove_reason = ?3
             WHERE id = ?4 AND removed_at IS NULL",
            params![millis(Utc::now()), performer.name, reason, active.id],
        )?;
        Ok(removed > 0)
    }
}

impl AutopromoteStore for SqliteStore {
    fn block_autopromote(
        &self,
        user: &UserIdentity,
        until: DateTime<Utc>,
        performer: &UserIdentity,
    ) -> Result<()> {
        let conn = self.db.get_conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO autopromote_blocks (user_id, until, performer_id, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                user.id as i64,
                millis(until),
                performer.id as i64,
                millis(Utc::now())
            ],
        )?;
        Ok(())
    }

    fn autopromote_blocked_until(&self, user: &UserIdentity) -> Result<Option<DateTime<Utc>>> {
        let conn = self.db.get_conn()?;
        let until: Option<i64> = conn
            .query_row(
                "SELECT until FROM autopromote_blocks WHERE user_id = ?1 AND until > ?2",
                params![user.id as i64, millis(Utc::now())],
                |row| row.get(0),
            )
            .optional()?;
        Ok(until.map(from_millis))
    }
}

impl TagStore for SqliteStore {
    fn add_tags(&self, specifier: &str, tags: &[String]) -> Result<()> {
        let mut conn = self.db.get_conn()?;
        let tx = conn.transaction()?;
        for tag in tags {
            tx.execute(
                "INSERT OR IGNORE INTO change_tags (specifier, tag) VALUES (?1, ?2)",
                params![specifier, tag],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn tags_for(&self, specifier: &str) -> Result<Vec<String>> {
        let conn = self.db.get_conn()?;
        let mut stmt =
            conn.prepare("SELECT tag FROM change_tags WHERE specifier = ?1 ORDER BY tag")?;
        let tags = stmt
            .query_map(params![specifier], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(tags)
    }
}

impl ThrottleStore for SqliteStore {
    fn hits_since(&self, key: &str, since: DateTime<Utc>) -> Result<u64> {
        let conn = self.db.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM throttle_hits WHERE key = ?1 AND hit_at >= ?2",
            params![key, millis(since)],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn record_hit(&self, key: &str, at: DateTime<Utc>) -> Result<()> {
        let conn = self.db.get_conn()?;
        conn.execute(
            "INSERT INTO throttle_hits (key, hit_at) VALUES (?1, ?2)",
            params![key, millis(at)],
        )?;
        Ok(())
    }
}

const LOG_COLUMNS: &str = "id, request_id, filter_key, actions, wiki, filter_wiki, user_id, \
                           user_name, target, action, ip, var_dump, timestamp";

struct LogRow {
    id: i64,
    request_id: String,
    filter_key: String,
    actions: String,
    wiki: String,
    filter_wiki: Option<String>,
    user_id: i64,
    user_name: String,
    target: String,
    action: String,
    ip: String,
    var_dump: String,
    timestamp: i64,
}

impl LogRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            request_id: row.get(1)?,
            filter_key: row.get(2)?,
            actions: row.get(3)?,
            wiki: row.get(4)?,
            filter_wiki: row.get(5)?,
            user_id: row.get(6)?,
            user_name: row.get(7)?,
            target: row.get(8)?,
            action: row.get(9)?,
            ip: row.get(10)?,
            var_dump: row.get(11)?,
            timestamp: row.get(12)?,
        })
    }

    fn into_entry(self) -> Result<AbuseLogEntry> {
        let corrupt = |field: &str| {
            AbuseFilterError::Config(format!("Corrupt {} in abuse log entry {}", field, self.id))
        };
        Ok(AbuseLogEntry {
            id: Some(self.id),
            request_id: self.request_id.parse().map_err(|_| corrupt("request id"))?,
            filter: self.filter_key.parse()?,
            actions: self
                .actions
                .split(',')
                .filter(|a| !a.is_empty())
                .map(str::to_string)
                .collect(),
            wiki: self.wiki.clone(),
            filter_wiki: self.filter_wiki.clone(),
            user: UserIdentity::new(self.user_id as u64, self.user_name.clone()),
            target: self.target.clone(),
            action: self.action.parse()?,
            ip: self.ip.parse().map_err(|_| corrupt("ip"))?,
            var_dump: self.var_dump.clone(),
            timestamp: from_millis(self.timestamp),
        })
    }
}

fn collect_entries(rows: Vec<LogRow>) -> Result<Vec<AbuseLogEntry>> {
    rows.into_iter().map(LogRow::into_entry).collect()
}

impl AbuseLogStore for SqliteStore {
    fn insert_log_entry(&self, entry: &AbuseLogEntry) -> Result<i64> {
        let conn = self.db.get_conn()?;
        conn.execute(
            "INSERT INTO abuse_log
                (request_id, filter_key, actions, wiki, filter_wiki, user_id, user_name,
                 target, action, ip, var_dump, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                entry.request_id.to_string(),
                entry.filter.to_string(),
                entry.actions.join(","),
                entry.wiki,
                entry.filter_wiki,
                entry.user.id as i64,
                entry.user.name,
                entry.target,
                entry.action.as_str(),
                entry.ip.to_string(),
                entry.var_dump,
                millis(entry.timestamp),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn log_entry(&self, id: i64) -> Result<Option<AbuseLogEntry>> {
        let conn = self.db.get_conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM abuse_log WHERE id = ?1", LOG_COLUMNS),
                params![id],
                LogRow::from_row,
            )
            .optional()?;
        row.map(LogRow::into_entry).transpose()
    }

    fn log_entries_for_filter(
        &self,
        key: &FilterKey,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<AbuseLogEntry>> {
        let conn = self.db.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM abuse_log
             WHERE filter_key = ?1 AND timestamp >= ?2 AND timestamp <= ?3
             ORDER BY timestamp, id",
            LOG_COLUMNS
        ))?;
        let rows = stmt
            .query_map(
                params![key.to_string(), millis(from), millis(to)],
                LogRow::from_row,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        collect_entries(rows)
    }

    fn recent_log_entries(&self, limit: usize) -> Result<Vec<AbuseLogEntry>> {
        let conn = self.db.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM abuse_log ORDER BY id DESC LIMIT ?1",
            LOG_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![limit as i64], LogRow::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        collect_entries(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::ActionKind;
    use chrono::Duration;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn store() -> (TempDir, SqliteStore) {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).unwrap();
        (temp_dir, SqliteStore::new(db))
    }

    #[test]
    fn test_filter_roundtrip_and_hit_count() {
        let (_dir, store) = store();
        let mut filter = Filter::new(FilterKey::global(3), "Spam")
            .with_action("block", ["blocktalk", "1 day", "1 day"]);
        filter.throttled = true;
        store.save_filter(&filter).unwrap();

        store.increment_hit_count(&FilterKey::global(3)).unwrap();
        let loaded = store.filter(&FilterKey::global(3)).unwrap().unwrap();
        assert_eq!(loaded.name, "Spam");
        assert!(loaded.throttled);
        assert_eq!(loaded.actions["block"], vec!["blocktalk", "1 day", "1 day"]);
        assert_eq!(loaded.hit_count, 1);

        assert!(store.filter(&FilterKey::local(3)).unwrap().is_none());
        assert!(store.increment_hit_count(&FilterKey::local(3)).is_err());
        assert_eq!(store.filters().unwrap().len(), 1);
    }

    #[test]
    fn test_system_user_is_stable() {
        let (_dir, store) = store();
        let first = store.find_or_create_system_user("Abuse filter").unwrap();
        let second = store.find_or_create_system_user("Abuse filter").unwrap();
        assert_eq!(first, second);
        assert_ne!(store.find_or_create_system_user("Other").unwrap().id, first.id);
    }

    #[test]
    fn test_group_changes_are_logged() {
        let (_dir, store) = store();
        let user = UserIdentity::new(7, "Mallory");
        let performer = UserIdentity::new(1, "Abuse filter");

        assert!(store.add_user_to_group(&user, "sysop", &performer).unwrap());
        assert!(!store.add_user_to_group(&user, "sysop", &performer).unwrap());
        assert_eq!(store.user_groups(&user).unwrap(), vec!["sysop"]);
        assert!(store.remove_user_from_group(&user, "sysop", &performer).unwrap());
        assert!(!store.remove_user_from_group(&user, "sysop", &performer).unwrap());

        let changes = store.group_changes(&user).unwrap();
        assert_eq!(changes.len(), 2);
        assert!(changes[0].added);
        assert!(!changes[1].added);
        assert_eq!(changes[1].performer, performer);
    }

    #[test]
    fn test_block_lifecycle() {
        let (_dir, store) = store();
        let target = BlockTarget::Range("10.0.0.0/16".parse().unwrap());
        let request = |performer: UserIdentity, expiry: Expiry| BlockRequest {
            target: target.clone(),
            performer,
            reason: "test".to_string(),
            expiry,
            prevent_talk_edit: true,
        };

        let first = store
            .place_block(&request(
                UserIdentity::new(1, "Abuse filter"),
                Expiry::At(Utc::now() + Duration::days(1)),
            ))
            .unwrap();
        assert!(first.is_placed());
        let second = store
            .place_block(&request(UserIdentity::new(2, "Admin"), Expiry::Infinite))
            .unwrap();
        assert!(second.is_placed());
        assert!(second.record().id > first.record().id);

        let active = store.active_block(&target).unwrap().unwrap();
        assert_eq!(active.id, second.record().id);
        assert_eq!(active.performer.name, "Admin");
        assert!(active.prevent_talk_edit);

        assert!(store
            .remove_block(&target, &UserIdentity::new(2, "Admin"), "done")
            .unwrap());
        assert!(store.active_block(&target).unwrap().is_none());
        assert!(!store
            .remove_block(&target, &UserIdentity::new(2, "Admin"), "again")
            .unwrap());
    }

    #[test]
    fn test_shorter_block_keeps_longer_one() {
        let (_dir, store) = store();
        let target = BlockTarget::User("Mallory".to_string());
        let admin = UserIdentity::new(2, "Admin");
        store
            .place_block(&BlockRequest {
                target: target.clone(),
                performer: admin.clone(),
                reason: "Long-term abuse".to_string(),
                expiry: Expiry::Infinite,
                prevent_talk_edit: true,
            })
            .unwrap();

        let placement = store
            .place_block(&BlockRequest {
                target: target.clone(),
                performer: UserIdentity::new(1, "Abuse filter"),
                reason: "Automatically blocked".to_string(),
                expiry: Expiry::At(Utc::now() + Duration::hours(1)),
                prevent_talk_edit: false,
            })
            .unwrap();
        match &placement {
            BlockPlacement::Kept(existing) => assert_eq!(existing.performer, admin),
            BlockPlacement::Placed(_) => panic!("a shorter block must not replace a longer one"),
        }

        let active = store.active_block(&target).unwrap().unwrap();
        assert_eq!(active.id, placement.record().id);
        assert!(active.expiry.is_infinite());
        assert!(active.prevent_talk_edit);
    }

    #[test]
    fn test_expired_block_is_inactive() {
        let (_dir, store) = store();
        let target = BlockTarget::User("Mallory".to_string());
        store
            .place_block(&BlockRequest {
                target: target.clone(),
                performer: UserIdentity::new(1, "Abuse filter"),
                reason: "short".to_string(),
                expiry: Expiry::At(Utc::now() - Duration::seconds(1)),
                prevent_talk_edit: false,
            })
            .unwrap();
        assert!(store.active_block(&target).unwrap().is_none());
    }

    #[test]
    fn test_autopromote_tags_and_throttle() {
        let (_dir, store) = store();
        let user = UserIdentity::new(7, "Mallory");
        let until = Utc::now() + Duration::days(5);
        store
            .block_autopromote(&user, until, &UserIdentity::new(1, "Abuse filter"))
            .unwrap();
        let stored = store.autopromote_blocked_until(&user).unwrap().unwrap();
        assert_eq!(stored.timestamp_millis(), until.timestamp_millis());

        store
            .add_tags("edit-Sandbox-by-Mallory", &["spam".to_string(), "links".to_string()])
            .unwrap();
        store
            .add_tags("edit-Sandbox-by-Mallory", &["spam".to_string()])
            .unwrap();
        assert_eq!(
            store.tags_for("edit-Sandbox-by-Mallory").unwrap(),
            vec!["links", "spam"]
        );

        let now = Utc::now();
        store.record_hit("k", now - Duration::minutes(10)).unwrap();
        store.record_hit("k", now).unwrap();
        assert_eq!(store.hits_since("k", now - Duration::minutes(1)).unwrap(), 1);
        assert_eq!(store.hits_since("other", now - Duration::hours(1)).unwrap(), 0);
    }

    #[test]
    fn test_abuse_log_queries() {
        let (_dir, store) = store();
        let now = Utc::now();
        let entry = |filter: FilterKey, actions: &[&str], timestamp| AbuseLogEntry {
            id: None,
            request_id: Uuid::new_v4(),
            filter,
            actions: actions.iter().map(|a| a.to_string()).collect(),
            wiki: "localwiki".to_string(),
            filter_wiki: filter.global.then(|| "metawiki".to_string()),
            user: UserIdentity::new(7, "Mallory"),
            target: "Sandbox".to_string(),
            action: ActionKind::Upload,
            ip: "2001:db8::7".parse().unwrap(),
            var_dump: "0".repeat(32),
            timestamp,
        };

        let old = store
            .insert_log_entry(&entry(FilterKey::local(1), &["block"], now - Duration::days(2)))
            .unwrap();
        let recent = store
            .insert_log_entry(&entry(FilterKey::local(1), &[], now))
            .unwrap();
        store
            .insert_log_entry(&entry(FilterKey::global(1), &["tag", "throttle"], now))
            .unwrap();

        let loaded = store.log_entry(old).unwrap().unwrap();
        assert_eq!(loaded.actions, vec!["block"]);
        assert_eq!(loaded.action, ActionKind::Upload);

        let window = store
            .log_entries_for_filter(&FilterKey::local(1), now - Duration::hours(1), now)
            .unwrap();
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].id, Some(recent));
        assert!(window[0].actions.is_empty());

        let latest = store.recent_log_entries(2).unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].filter, FilterKey::global(1));
        assert_eq!(latest[0].filter_wiki.as_deref(), Some("metawiki"));
        assert!(store.log_entry(999).unwrap().is_none());
    }
}
