//! Certification record store and its SQLite implementation.
//!
//! # Responsibility
//! - Persist certification records and per-user progress.
//! - Apply accepted rewards atomically and at most once per record.
//!
//! # Invariants
//! - `apply_accepted` runs in one IMMEDIATE transaction: applied-id insert,
//!   progress mutation and status transition commit or roll back together.
//! - A record id present in `ledger_applications` is never applied again.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::catalog::policy;
use crate::db::DbError;
use crate::model::activity::ActivityKind;
use crate::model::certification::{
    CertificationRecord, CertificationStatus, RecordId, RewardDelta, StatusTransitionError,
};
use crate::model::progress::{kg_to_tenths, level_for_trees, tenths_to_kg, UserProgress};
use crate::model::verdict::{Verdict, VerdictSource};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const RECORD_SELECT_SQL: &str = "SELECT
    id,
    submission_id,
    user_id,
    activity,
    evidence_ref,
    verdict_valid,
    verdict_confidence,
    verdict_reason,
    verdict_source,
    reward_carbon_tenths,
    reward_points,
    status,
    classifier_reply,
    created_at,
    resolved_at
FROM certification_records";

const REQUIRED_TABLES: &[&str] = &[
    "certification_records",
    "user_progress",
    "ledger_applications",
    "user_profiles",
];

/// Default page size for history queries.
pub const HISTORY_DEFAULT_LIMIT: u32 = 50;
/// Upper bound for history queries.
pub const HISTORY_LIMIT_MAX: u32 = 500;

pub type RepoResult<T> = Result<T, RepoError>;

/// Record store error.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    NotFound(RecordId),
    InvalidData(String),
    /// Record is not in a state that allows the requested transition.
    StatusConflict {
        record_id: RecordId,
        status: CertificationStatus,
    },
    /// Stored verdict is invalid; the record can only be rejected.
    RejectedVerdict(RecordId),
    IllegalTransition(StatusTransitionError),
    MissingRequiredTable(&'static str),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "certification record not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted ledger data: {message}"),
            Self::StatusConflict { record_id, status } => write!(
                f,
                "certification record {record_id} is already {}",
                status.as_str()
            ),
            Self::RejectedVerdict(id) => {
                write!(f, "certification record {id} carries a rejected verdict")
            }
            Self::IllegalTransition(err) => write!(f, "{err}"),
            Self::MissingRequiredTable(table) => write!(f, "missing required table `{table}`"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::IllegalTransition(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<StatusTransitionError> for RepoError {
    fn from(value: StatusTransitionError) -> Self {
        Self::IllegalTransition(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// One accepted reward to merge into a user's progress.
///
/// Must match the reward stored on the record and the catalog tree flag of
/// its activity; the store refuses any other amount.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerApplication {
    pub record_id: RecordId,
    pub user_id: String,
    pub reward: RewardDelta,
    /// Trees to add, 0 or 1.
    pub trees: u32,
    /// Unix epoch milliseconds.
    pub applied_at: i64,
}

/// Result of `apply_accepted`.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerOutcome {
    /// Reward merged now.
    Applied(UserProgress),
    /// Record id was applied before; progress untouched.
    AlreadyApplied(UserProgress),
}

impl LedgerOutcome {
    pub fn progress(&self) -> &UserProgress {
        match self {
            Self::Applied(progress) | Self::AlreadyApplied(progress) => progress,
        }
    }
}

/// Record store contract used by the certification pipeline.
pub trait RecordStore {
    /// Appends a new pending record.
    fn insert_record(&mut self, record: &CertificationRecord) -> RepoResult<()>;
    /// Atomically applies an accepted reward and marks the record accepted.
    ///
    /// Only pending records with a valid stored verdict qualify, and only for
    /// the reward persisted on the record.
    fn apply_accepted(&mut self, application: &LedgerApplication) -> RepoResult<LedgerOutcome>;
    /// Marks a pending record rejected. Repeating on a rejected record is a no-op.
    fn mark_rejected(&mut self, record_id: RecordId, resolved_at: i64) -> RepoResult<()>;
    fn get_record(&self, record_id: RecordId) -> RepoResult<Option<CertificationRecord>>;
    /// Newest first.
    fn list_records_for_user(
        &self,
        user_id: &str,
        limit: Option<u32>,
    ) -> RepoResult<Vec<CertificationRecord>>;
    /// Returns empty progress for users never credited.
    fn get_progress(&self, user_id: &str) -> RepoResult<UserProgress>;
    /// Mirrors progress into the denormalized profile row.
    fn upsert_profile_snapshot(&mut self, progress: &UserProgress, synced_at: i64)
        -> RepoResult<()>;
}

/// SQLite-backed record store.
pub struct SqliteRecordStore<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> SqliteRecordStore<'conn> {
    /// Constructs a store from a migrated connection.
    pub fn try_new(conn: &'conn mut Connection) -> RepoResult<Self> {
        for &table in REQUIRED_TABLES {
            if !table_exists(conn, table)? {
                return Err(RepoError::MissingRequiredTable(table));
            }
        }
        Ok(Self { conn })
    }
}

impl RecordStore for SqliteRecordStore<'_> {
    fn insert_record(&mut self, record: &CertificationRecord) -> RepoResult<()> {
        if record.status != CertificationStatus::Pending {
            return Err(RepoError::InvalidData(format!(
                "new record {} must be pending, got {}",
                record.id,
                record.status.as_str()
            )));
        }

        self.conn.execute(
            "INSERT INTO certification_records (
                id,
                submission_id,
                user_id,
                activity,
                evidence_ref,
                verdict_valid,
                verdict_confidence,
                verdict_reason,
                verdict_source,
                reward_carbon_tenths,
                reward_points,
                status,
                classifier_reply,
                created_at,
                resolved_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, NULL);",
            params![
                record.id.to_string(),
                record.submission_id.to_string(),
                record.user_id.as_str(),
                record.activity.as_str(),
                record.evidence_ref.as_str(),
                bool_to_int(record.verdict.valid),
                i64::from(record.verdict.confidence),
                record.verdict.reason.as_str(),
                record.verdict.source.as_str(),
                tenths_to_db(kg_to_tenths(record.reward.carbon_reduction_kg))?,
                i64::from(record.reward.points),
                record.status.as_str(),
                record.classifier_reply.as_deref(),
                record.created_at,
            ],
        )?;
        Ok(())
    }

    fn apply_accepted(&mut self, application: &LedgerApplication) -> RepoResult<LedgerOutcome> {
        let record_text = application.record_id.to_string();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        if ledger_entry_exists(&tx, &record_text)? {
            let progress = load_progress(&tx, &application.user_id)?;
            tx.commit()?;
            return Ok(LedgerOutcome::AlreadyApplied(progress));
        }

        let stored = load_record_state(&tx, application.record_id)?;
        if stored.user_id != application.user_id {
            return Err(RepoError::InvalidData(format!(
                "record {} belongs to another user",
                application.record_id
            )));
        }
        if stored.status != CertificationStatus::Pending {
            return Err(RepoError::StatusConflict {
                record_id: application.record_id,
                status: stored.status,
            });
        }
        if !stored.verdict_valid {
            return Err(RepoError::RejectedVerdict(application.record_id));
        }

        let carbon_tenths = stored.carbon_tenths;
        let expected_trees = u32::from(policy(stored.activity).grows_tree);
        if kg_to_tenths(application.reward.carbon_reduction_kg) != carbon_tenths
            || application.reward.points != stored.points
            || application.trees != expected_trees
        {
            return Err(RepoError::InvalidData(format!(
                "ledger application for record {} does not match its stored reward",
                application.record_id
            )));
        }
        tx.execute(
            "INSERT INTO ledger_applications (
                record_id,
                user_id,
                points,
                carbon_tenths,
                trees,
                applied_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                record_text.as_str(),
                application.user_id.as_str(),
                i64::from(application.reward.points),
                tenths_to_db(carbon_tenths)?,
                i64::from(application.trees),
                application.applied_at,
            ],
        )?;

        let current = load_progress_row(&tx, &application.user_id)?;
        let total_points = current
            .points
            .checked_add(u64::from(application.reward.points))
            .ok_or_else(|| RepoError::InvalidData("total points overflow".to_string()))?;
        let total_trees = current
            .trees
            .checked_add(application.trees)
            .ok_or_else(|| RepoError::InvalidData("total trees overflow".to_string()))?;
        let total_carbon_tenths = current
            .carbon_tenths
            .checked_add(carbon_tenths)
            .ok_or_else(|| RepoError::InvalidData("total carbon overflow".to_string()))?;
        let level = level_for_trees(total_trees);

        tx.execute(
            "INSERT INTO user_progress (
                user_id,
                total_points,
                total_trees,
                level,
                total_carbon_tenths,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT (user_id) DO UPDATE SET
                total_points = excluded.total_points,
                total_trees = excluded.total_trees,
                level = excluded.level,
                total_carbon_tenths = excluded.total_carbon_tenths,
                updated_at = excluded.updated_at;",
            params![
                application.user_id.as_str(),
                points_to_db(total_points)?,
                i64::from(total_trees),
                i64::from(level),
                tenths_to_db(total_carbon_tenths)?,
                application.applied_at,
            ],
        )?;

        let changed = tx.execute(
            "UPDATE certification_records
             SET status = 'accepted', resolved_at = ?1
             WHERE id = ?2 AND status = 'pending';",
            params![application.applied_at, record_text.as_str()],
        )?;
        if changed != 1 {
            return Err(RepoError::InvalidData(format!(
                "record {} left pending state during ledger application",
                application.record_id
            )));
        }

        tx.commit()?;
        Ok(LedgerOutcome::Applied(UserProgress {
            user_id: application.user_id.clone(),
            total_points,
            total_trees,
            level,
            total_carbon_reduction_kg: tenths_to_kg(total_carbon_tenths),
        }))
    }

    fn mark_rejected(&mut self, record_id: RecordId, resolved_at: i64) -> RepoResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let status = load_record_state(&tx, record_id)?.status;
        match status {
            CertificationStatus::Rejected => return Ok(()),
            CertificationStatus::Accepted => {
                return Err(RepoError::StatusConflict { record_id, status });
            }
            CertificationStatus::Pending => {}
        }

        tx.execute(
            "UPDATE certification_records
             SET status = 'rejected', resolved_at = ?1
             WHERE id = ?2 AND status = 'pending';",
            params![resolved_at, record_id.to_string()],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn get_record(&self, record_id: RecordId) -> RepoResult<Option<CertificationRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{RECORD_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([record_id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_record_row(row)?));
        }
        Ok(None)
    }

    fn list_records_for_user(
        &self,
        user_id: &str,
        limit: Option<u32>,
    ) -> RepoResult<Vec<CertificationRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "{RECORD_SELECT_SQL}
             WHERE user_id = ?1
             ORDER BY created_at DESC, id ASC
             LIMIT ?2;"
        ))?;
        let mut rows = stmt.query(params![user_id, i64::from(normalize_history_limit(limit))])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(parse_record_row(row)?);
        }
        Ok(records)
    }

    fn get_progress(&self, user_id: &str) -> RepoResult<UserProgress> {
        load_progress(&*self.conn, user_id)
    }

    fn upsert_profile_snapshot(
        &mut self,
        progress: &UserProgress,
        synced_at: i64,
    ) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO user_profiles (user_id, points, trees, level, synced_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (user_id) DO UPDATE SET
                points = excluded.points,
                trees = excluded.trees,
                level = excluded.level,
                synced_at = excluded.synced_at;",
            params![
                progress.user_id.as_str(),
                points_to_db(progress.total_points)?,
                i64::from(progress.total_trees),
                i64::from(progress.level),
                synced_at,
            ],
        )?;
        Ok(())
    }
}

/// Clamps a history page size into `1..=HISTORY_LIMIT_MAX`.
pub fn normalize_history_limit(limit: Option<u32>) -> u32 {
    match limit {
        None | Some(0) => HISTORY_DEFAULT_LIMIT,
        Some(value) => value.min(HISTORY_LIMIT_MAX),
    }
}

struct ProgressRow {
    points: u64,
    trees: u32,
    carbon_tenths: u64,
}

fn load_progress_row(conn: &Connection, user_id: &str) -> RepoResult<ProgressRow> {
    let row = conn
        .query_row(
            "SELECT total_points, total_trees, total_carbon_tenths
             FROM user_progress
             WHERE user_id = ?1;",
            [user_id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            },
        )
        .optional()?;

    let Some((points, trees, carbon_tenths)) = row else {
        return Ok(ProgressRow {
            points: 0,
            trees: 0,
            carbon_tenths: 0,
        });
    };

    Ok(ProgressRow {
        points: non_negative(points, "user_progress.total_points")?,
        trees: u32::try_from(trees).map_err(|_| {
            RepoError::InvalidData(format!("invalid user_progress.total_trees `{trees}`"))
        })?,
        carbon_tenths: non_negative(carbon_tenths, "user_progress.total_carbon_tenths")?,
    })
}

fn load_progress(conn: &Connection, user_id: &str) -> RepoResult<UserProgress> {
    let row = load_progress_row(conn, user_id)?;
    Ok(UserProgress {
        user_id: user_id.to_string(),
        total_points: row.points,
        total_trees: row.trees,
        level: level_for_trees(row.trees),
        total_carbon_reduction_kg: tenths_to_kg(row.carbon_tenths),
    })
}

fn ledger_entry_exists(tx: &Transaction<'_>, record_id: &str) -> RepoResult<bool> {
    let exists: i64 = tx.query_row(
        "SELECT EXISTS(SELECT 1 FROM ledger_applications WHERE record_id = ?1);",
        [record_id],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

/// Ledger-relevant columns of one record, read inside the write transaction.
struct RecordState {
    user_id: String,
    activity: ActivityKind,
    status: CertificationStatus,
    verdict_valid: bool,
    carbon_tenths: u64,
    points: u32,
}

fn load_record_state(tx: &Transaction<'_>, record_id: RecordId) -> RepoResult<RecordState> {
    let state = tx
        .query_row(
            "SELECT user_id, activity, status, verdict_valid, reward_carbon_tenths, reward_points
             FROM certification_records
             WHERE id = ?1;",
            [record_id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            },
        )
        .optional()?;
    let (user_id, activity_text, status_text, valid, carbon_tenths, points) =
        state.ok_or(RepoError::NotFound(record_id))?;

    let activity = ActivityKind::parse(&activity_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid activity `{activity_text}` for record {record_id}"
        ))
    })?;
    let status = CertificationStatus::parse(&status_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid status `{status_text}` for record {record_id}"))
    })?;
    let points = u32::try_from(points)
        .map_err(|_| RepoError::InvalidData(format!("invalid reward_points `{points}`")))?;

    Ok(RecordState {
        user_id,
        activity,
        status,
        verdict_valid: valid == 1,
        carbon_tenths: non_negative(carbon_tenths, "reward_carbon_tenths")?,
        points,
    })
}

fn parse_record_row(row: &Row<'_>) -> RepoResult<CertificationRecord> {
    let id = parse_uuid(row.get::<_, String>("id")?, "id")?;
    let submission_id = parse_uuid(row.get::<_, String>("submission_id")?, "submission_id")?;

    let activity_text: String = row.get("activity")?;
    let activity = ActivityKind::parse(&activity_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid activity `{activity_text}`"))
    })?;

    let source_text: String = row.get("verdict_source")?;
    let source = VerdictSource::parse(&source_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid verdict source `{source_text}`"))
    })?;

    let status_text: String = row.get("status")?;
    let status = CertificationStatus::parse(&status_text)
        .ok_or_else(|| RepoError::InvalidData(format!("invalid status `{status_text}`")))?;

    let confidence: i64 = row.get("verdict_confidence")?;
    let confidence = u8::try_from(confidence)
        .ok()
        .filter(|value| *value <= 100)
        .ok_or_else(|| RepoError::InvalidData(format!("invalid confidence `{confidence}`")))?;

    let valid = match row.get::<_, i64>("verdict_valid")? {
        0 => false,
        1 => true,
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid verdict_valid value `{other}`"
            )));
        }
    };

    let carbon_tenths = non_negative(
        row.get::<_, i64>("reward_carbon_tenths")?,
        "reward_carbon_tenths",
    )?;
    let points: i64 = row.get("reward_points")?;
    let points = u32::try_from(points)
        .map_err(|_| RepoError::InvalidData(format!("invalid reward_points `{points}`")))?;

    Ok(CertificationRecord {
        id,
        submission_id,
        user_id: row.get("user_id")?,
        activity,
        evidence_ref: row.get("evidence_ref")?,
        verdict: Verdict {
            valid,
            confidence,
            reason: row.get("verdict_reason")?,
            source,
        },
        reward: RewardDelta {
            carbon_reduction_kg: tenths_to_kg(carbon_tenths),
            points,
        },
        status,
        classifier_reply: row.get("classifier_reply")?,
        created_at: row.get("created_at")?,
        resolved_at: row.get("resolved_at")?,
    })
}

fn parse_uuid(value: String, column: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(&value).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid uuid value `{value}` in certification_records.{column}"
        ))
    })
}

fn non_negative(value: i64, column: &str) -> RepoResult<u64> {
    u64::try_from(value)
        .map_err(|_| RepoError::InvalidData(format!("negative value `{value}` in {column}")))
}

fn tenths_to_db(value: u64) -> RepoResult<i64> {
    i64::try_from(value)
        .map_err(|_| RepoError::InvalidData(format!("carbon amount `{value}` out of range")))
}

fn points_to_db(value: u64) -> RepoResult<i64> {
    i64::try_from(value)
        .map_err(|_| RepoError::InvalidData(format!("points `{value}` out of range")))
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1);",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::normalize_history_limit;

    #[test]
    fn history_limit_is_normalized() {
        assert_eq!(normalize_history_limit(None), 50);
        assert_eq!(normalize_history_limit(Some(0)), 50);
        assert_eq!(normalize_history_limit(Some(7)), 7);
        assert_eq!(normalize_history_limit(Some(10_000)), 500);
    }
}
