use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres, Transaction};
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use spacesync_core::repository::{
    BookingRepository, LabWindowRepository, ProfileRepository, RoomRepository, Store, StoreError,
    StoreResult, StoreTransaction,
};
use spacesync_core::{Booking, BookingStatus, Cancellation, LabWindow, Role, Room, RoomStatus, UserProfile};

const ROOM_COLUMNS: &str = "id, room_id, status, current_booking_id, synced_from_timetable, created_at";
const BOOKING_COLUMNS: &str = "id, room_id, user_id, user_email, user_role, purpose, start_time, expires_at, status, cancelled_at, cancelled_by, cancellation_note";
const PROFILE_COLUMNS: &str = "uid, email, role, batch, metadata, created_at, last_login, verified_at, verified_by, revoked_at, revoked_by";

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&self.pool)
            .await?;
        info!("Migrations completed successfully.");
        Ok(())
    }
}

fn map_err(err: sqlx::Error) -> StoreError {
    if let Some(db) = err.as_database_error() {
        if db.is_unique_violation() || db.code().as_deref() == Some("40001") {
            return StoreError::Conflict(db.message().to_string());
        }
    }
    StoreError::Backend(err.to_string())
}

// Internal structs for type-safe querying

#[derive(sqlx::FromRow)]
struct RoomRow {
    id: Uuid,
    room_id: String,
    status: Option<String>,
    current_booking_id: Option<Uuid>,
    synced_from_timetable: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<RoomRow> for Room {
    type Error = StoreError;

    fn try_from(row: RoomRow) -> Result<Self, Self::Error> {
        Ok(Room {
            id: row.id,
            status: RoomStatus::from_stored(row.status.as_deref()).map_err(StoreError::Corrupt)?,
            room_id: row.room_id,
            current_booking_id: row.current_booking_id,
            synced_from_timetable: row.synced_from_timetable,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    room_id: String,
    user_id: String,
    user_email: Option<String>,
    user_role: String,
    purpose: Option<String>,
    start_time: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    status: String,
    cancelled_at: Option<DateTime<Utc>>,
    cancelled_by: Option<String>,
    cancellation_note: Option<String>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(Booking {
            id: row.id,
            room_id: row.room_id,
            user_id: row.user_id,
            user_email: row.user_email,
            user_role: row.user_role.parse::<Role>().map_err(StoreError::Corrupt)?,
            purpose: row.purpose,
            start_time: row.start_time,
            expires_at: row.expires_at,
            status: row.status.parse::<BookingStatus>().map_err(StoreError::Corrupt)?,
            cancelled_at: row.cancelled_at,
            cancelled_by: row.cancelled_by,
            cancellation_note: row.cancellation_note,
        })
    }
}

#[derive(sqlx::FromRow)]
struct LabWindowRow {
    id: String,
    batch: String,
    day: String,
    time: String,
    room_id: String,
    lab_location: String,
    updated_at: DateTime<Utc>,
}

impl From<LabWindowRow> for LabWindow {
    fn from(row: LabWindowRow) -> Self {
        LabWindow {
            id: row.id,
            batch: row.batch,
            day: row.day,
            time: row.time,
            room_id: row.room_id,
            lab_location: row.lab_location,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ProfileRow {
    uid: String,
    email: Option<String>,
    role: String,
    batch: Option<String>,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
    last_login: Option<DateTime<Utc>>,
    verified_at: Option<DateTime<Utc>>,
    verified_by: Option<String>,
    revoked_at: Option<DateTime<Utc>>,
    revoked_by: Option<String>,
}

impl TryFrom<ProfileRow> for UserProfile {
    type Error = StoreError;

    fn try_from(row: ProfileRow) -> Result<Self, Self::Error> {
        Ok(UserProfile {
            uid: row.uid,
            email: row.email,
            role: row.role.parse::<Role>().map_err(StoreError::Corrupt)?,
            batch: row.batch,
            metadata: row.metadata,
            created_at: row.created_at,
            last_login: row.last_login,
            verified_at: row.verified_at,
            verified_by: row.verified_by,
            revoked_at: row.revoked_at,
            revoked_by: row.revoked_by,
        })
    }
}

fn convert<R, T>(rows: Vec<R>) -> StoreResult<Vec<T>>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

/// Like [`convert`], but drops rows that fail to decode instead of failing the batch.
fn convert_skipping<R, T>(rows: Vec<R>, what: &str) -> Vec<T>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter()
        .filter_map(|row| match T::try_from(row) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!("Skipping undecodable {} row: {}", what, e);
                None
            }
        })
        .collect()
}

#[async_trait]
impl RoomRepository for DbClient {
    async fn list_rooms(&self) -> StoreResult<Vec<Room>> {
        let rows: Vec<RoomRow> = sqlx::query_as(&format!("SELECT {} FROM rooms ORDER BY room_id", ROOM_COLUMNS))
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)?;
        convert(rows)
    }

    async fn get_room(&self, id: Uuid) -> StoreResult<Option<Room>> {
        let row: Option<RoomRow> = sqlx::query_as(&format!("SELECT {} FROM rooms WHERE id = $1", ROOM_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?;
        row.map(Room::try_from).transpose()
    }

    async fn find_room(&self, room_id: &str) -> StoreResult<Option<Room>> {
        let row: Option<RoomRow> = sqlx::query_as(&format!("SELECT {} FROM rooms WHERE room_id = $1", ROOM_COLUMNS))
            .bind(room_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?;
        row.map(Room::try_from).transpose()
    }

    async fn insert_rooms(&self, rooms: &[Room]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(map_err)?;

        for room in rooms {
            sqlx::query(
                r#"
                INSERT INTO rooms (id, room_id, status, current_booking_id, synced_from_timetable, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(room.id)
            .bind(&room.room_id)
            .bind(room.status.as_str())
            .bind(room.current_booking_id)
            .bind(room.synced_from_timetable)
            .bind(room.created_at)
            .execute(&mut *tx)
            .await
            .map_err(map_err)?;
        }

        tx.commit().await.map_err(map_err)
    }
}

#[async_trait]
impl BookingRepository for DbClient {
    async fn list_bookings(&self) -> StoreResult<Vec<Booking>> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM bookings ORDER BY start_time DESC",
            BOOKING_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;
        convert(rows)
    }

    async fn list_bookings_for_user(&self, user_id: &str) -> StoreResult<Vec<Booking>> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM bookings WHERE user_id = $1 ORDER BY start_time DESC",
            BOOKING_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;
        convert(rows)
    }

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        let row: Option<BookingRow> = sqlx::query_as(&format!("SELECT {} FROM bookings WHERE id = $1", BOOKING_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?;
        row.map(Booking::try_from).transpose()
    }

    async fn list_active_bookings(&self) -> StoreResult<Vec<Booking>> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM bookings WHERE status = 'active'",
            BOOKING_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;
        convert(rows)
    }

    async fn list_expired_bookings(&self, now: DateTime<Utc>) -> StoreResult<Vec<Booking>> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM bookings WHERE status = 'active' AND expires_at <= $1 ORDER BY room_id, id",
            BOOKING_COLUMNS
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(convert_skipping(rows, "expired booking"))
    }
}

#[async_trait]
impl LabWindowRepository for DbClient {
    async fn list_lab_windows(&self) -> StoreResult<Vec<LabWindow>> {
        let rows: Vec<LabWindowRow> = sqlx::query_as(
            "SELECT id, batch, day, time, room_id, lab_location, updated_at FROM lab_windows",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(rows.into_iter().map(LabWindow::from).collect())
    }

    async fn upsert_lab_windows(&self, windows: &[LabWindow]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(map_err)?;

        for w in windows {
            sqlx::query(
                r#"
                INSERT INTO lab_windows (id, batch, day, time, room_id, lab_location, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (id) DO UPDATE SET
                    batch = EXCLUDED.batch,
                    day = EXCLUDED.day,
                    time = EXCLUDED.time,
                    room_id = EXCLUDED.room_id,
                    lab_location = EXCLUDED.lab_location,
                    updated_at = EXCLUDED.updated_at
                "#,
            )
            .bind(&w.id)
            .bind(&w.batch)
            .bind(&w.day)
            .bind(&w.time)
            .bind(&w.room_id)
            .bind(&w.lab_location)
            .bind(w.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(map_err)?;
        }

        tx.commit().await.map_err(map_err)
    }
}

#[async_trait]
impl ProfileRepository for DbClient {
    async fn get_profile(&self, uid: &str) -> StoreResult<Option<UserProfile>> {
        let row: Option<ProfileRow> = sqlx::query_as(&format!("SELECT {} FROM users WHERE uid = $1", PROFILE_COLUMNS))
            .bind(uid)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?;
        row.map(UserProfile::try_from).transpose()
    }

    async fn find_profile_by_email(&self, email: &str) -> StoreResult<Option<UserProfile>> {
        let row: Option<ProfileRow> = sqlx::query_as(&format!(
            "SELECT {} FROM users WHERE lower(email) = lower($1) LIMIT 1",
            PROFILE_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_err)?;
        row.map(UserProfile::try_from).transpose()
    }

    async fn list_profiles(&self) -> StoreResult<Vec<UserProfile>> {
        let rows: Vec<ProfileRow> = sqlx::query_as(&format!("SELECT {} FROM users ORDER BY created_at", PROFILE_COLUMNS))
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)?;
        convert(rows)
    }

    async fn save_profile(&self, p: &UserProfile) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (uid, email, role, batch, metadata, created_at, last_login, verified_at, verified_by, revoked_at, revoked_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (uid) DO UPDATE SET
                email = EXCLUDED.email,
                role = EXCLUDED.role,
                batch = EXCLUDED.batch,
                metadata = EXCLUDED.metadata,
                last_login = EXCLUDED.last_login,
                verified_at = EXCLUDED.verified_at,
                verified_by = EXCLUDED.verified_by,
                revoked_at = EXCLUDED.revoked_at,
                revoked_by = EXCLUDED.revoked_by
            "#,
        )
        .bind(&p.uid)
        .bind(&p.email)
        .bind(p.role.as_str())
        .bind(&p.batch)
        .bind(&p.metadata)
        .bind(p.created_at)
        .bind(p.last_login)
        .bind(p.verified_at)
        .bind(&p.verified_by)
        .bind(p.revoked_at)
        .bind(&p.revoked_by)
        .execute(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(())
    }

    async fn touch_last_login(&self, uid: &str, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE users SET last_login = $2 WHERE uid = $1")
            .bind(uid)
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(())
    }
}

#[async_trait]
impl Store for DbClient {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        let tx = self.pool.begin().await.map_err(map_err)?;
        Ok(Box::new(PgTransaction { tx, has_savepoint: false }))
    }
}

/// Row locks (`FOR UPDATE`) held until commit; dropping rolls back.
pub struct PgTransaction {
    tx: Transaction<'static, Postgres>,
    has_savepoint: bool,
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn savepoint(&mut self) -> StoreResult<()> {
        sqlx::query("SAVEPOINT spacesync_item")
            .execute(&mut *self.tx)
            .await
            .map_err(map_err)?;
        self.has_savepoint = true;
        Ok(())
    }

    async fn rollback_to_savepoint(&mut self) -> StoreResult<()> {
        if !self.has_savepoint {
            return Err(StoreError::Backend("no savepoint to roll back to".to_string()));
        }
        sqlx::query("ROLLBACK TO SAVEPOINT spacesync_item")
            .execute(&mut *self.tx)
            .await
            .map_err(map_err)?;
        Ok(())
    }
    async fn room_for_update(&mut self, room_id: &str) -> StoreResult<Option<Room>> {
        let row: Option<RoomRow> = sqlx::query_as(&format!(
            "SELECT {} FROM rooms WHERE room_id = $1 FOR UPDATE",
            ROOM_COLUMNS
        ))
        .bind(room_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_err)?;
        row.map(Room::try_from).transpose()
    }

    async fn booking_for_update(&mut self, id: Uuid) -> StoreResult<Option<Booking>> {
        let row: Option<BookingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM bookings WHERE id = $1 FOR UPDATE",
            BOOKING_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_err)?;
        row.map(Booking::try_from).transpose()
    }

    async fn insert_booking(&mut self, b: &Booking) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO bookings (id, room_id, user_id, user_email, user_role, purpose, start_time, expires_at, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(b.id)
        .bind(&b.room_id)
        .bind(&b.user_id)
        .bind(&b.user_email)
        .bind(b.user_role.as_str())
        .bind(&b.purpose)
        .bind(b.start_time)
        .bind(b.expires_at)
        .bind(b.status.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(map_err)?;
        Ok(())
    }

    async fn occupy_room(&mut self, room_id: &str, booking_id: Uuid) -> StoreResult<()> {
        sqlx::query("UPDATE rooms SET status = 'occupied', current_booking_id = $2 WHERE room_id = $1")
            .bind(room_id)
            .bind(booking_id)
            .execute(&mut *self.tx)
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn release_room(&mut self, room_id: &str, held_by: Option<Uuid>) -> StoreResult<bool> {
        let result = match held_by {
            Some(booking_id) => {
                sqlx::query(
                    "UPDATE rooms SET status = 'available', current_booking_id = NULL WHERE room_id = $1 AND current_booking_id = $2",
                )
                .bind(room_id)
                .bind(booking_id)
                .execute(&mut *self.tx)
                .await
            }
            None => {
                sqlx::query(
                    r#"
                    UPDATE rooms SET status = 'available', current_booking_id = NULL
                    WHERE room_id = $1 AND (status IS DISTINCT FROM 'available' OR current_booking_id IS NOT NULL)
                    "#,
                )
                .bind(room_id)
                .execute(&mut *self.tx)
                .await
            }
        }
        .map_err(map_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn finish_booking(
        &mut self,
        id: Uuid,
        status: BookingStatus,
        cancellation: Option<&Cancellation>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE bookings SET
                status = $2,
                cancelled_at = COALESCE($3, cancelled_at),
                cancelled_by = COALESCE($4, cancelled_by),
                cancellation_note = COALESCE($5, cancellation_note)
            WHERE id = $1 AND status = 'active'
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(cancellation.map(|c| c.cancelled_at))
        .bind(cancellation.map(|c| c.cancelled_by.as_str()))
        .bind(cancellation.and_then(|c| c.note.as_deref()))
        .execute(&mut *self.tx)
        .await
        .map_err(map_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await.map_err(map_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_row_without_status_is_available() {
        let row = RoomRow {
            id: Uuid::new_v4(),
            room_id: "B201".into(),
            status: None,
            current_booking_id: None,
            synced_from_timetable: false,
            created_at: Utc::now(),
        };
        let room = Room::try_from(row).unwrap();
        assert!(room.is_available());
    }

    #[test]
    fn test_unknown_booking_status_is_corrupt() {
        let now = Utc::now();
        let row = BookingRow {
            id: Uuid::new_v4(),
            room_id: "B201".into(),
            user_id: "u1".into(),
            user_email: None,
            user_role: "club_lead".into(),
            purpose: None,
            start_time: now,
            expires_at: now,
            status: "paused".into(),
            cancelled_at: None,
            cancelled_by: None,
            cancellation_note: None,
        };
        assert!(matches!(Booking::try_from(row), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn test_expired_scan_skips_corrupt_rows() {
        let now = Utc::now();
        let row = |status: &str| BookingRow {
            id: Uuid::new_v4(),
            room_id: "B201".into(),
            user_id: "u1".into(),
            user_email: None,
            user_role: "club_lead".into(),
            purpose: None,
            start_time: now,
            expires_at: now,
            status: status.into(),
            cancelled_at: None,
            cancelled_by: None,
            cancellation_note: None,
        };
        let good = row("active");
        let good_id = good.id;

        let bookings: Vec<Booking> = convert_skipping(vec![row("paused"), good], "booking");

        assert_eq!(bookings.len(), 1);
        assert_eq!(bookings[0].id, good_id);
    }
}
