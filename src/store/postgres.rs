//! Postgres adapter. The capacity check-and-insert runs inside an explicit
//! transaction that locks the slot row with `FOR UPDATE`, so two concurrent
//! attempts on the same slot serialize on the lock and the recount always
//! sees committed state.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::models::{Attendee, Booking, BookingView, Slot, SlotWithRemaining, User};

use super::{BookingFilter, BookingStore, CapacityOutcome, NewSlot, NewUser, StoreError, UserPatch};

// Firestore capped batches around 500 writes; the same ceiling keeps a
// single INSERT statement well under the bind-parameter limit.
const BULK_CHUNK: usize = 450;

const USER_COLUMNS: &str = "id, name, email, password_hash, role, created_at";

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_unique_violation(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return StoreError::EmailTaken;
        }
    }
    StoreError::Database(err)
}

#[async_trait]
impl BookingStore for PgStore {
    async fn create_slot(&self, slot: NewSlot) -> Result<Slot, StoreError> {
        let slot = sqlx::query_as::<_, Slot>(
            "INSERT INTO slots (start_time, end_time, capacity) VALUES ($1, $2, $3) \
             RETURNING id, start_time, end_time, capacity",
        )
        .bind(slot.start_time)
        .bind(slot.end_time)
        .bind(slot.capacity)
        .fetch_one(&self.pool)
        .await?;
        Ok(slot)
    }

    async fn insert_slots(&self, slots: &[NewSlot]) -> Result<u64, StoreError> {
        let mut created = 0u64;
        for chunk in slots.chunks(BULK_CHUNK) {
            let mut qb: QueryBuilder<Postgres> =
                QueryBuilder::new("INSERT INTO slots (start_time, end_time, capacity) ");
            qb.push_values(chunk, |mut row, slot| {
                row.push_bind(slot.start_time)
                    .push_bind(slot.end_time)
                    .push_bind(slot.capacity);
            });
            let result = qb.build().execute(&self.pool).await?;
            created += result.rows_affected();
        }
        Ok(created)
    }

    async fn get_slot(&self, id: i64) -> Result<Option<Slot>, StoreError> {
        let slot = sqlx::query_as::<_, Slot>(
            "SELECT id, start_time, end_time, capacity FROM slots WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(slot)
    }

    async fn delete_slot(&self, id: i64) -> Result<(), StoreError> {
        // Bookings go with the slot via ON DELETE CASCADE.
        sqlx::query("DELETE FROM slots WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_all_slots(&self) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM bookings").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM slots").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_slots(
        &self,
        window: Option<(NaiveDateTime, NaiveDateTime)>,
    ) -> Result<Vec<SlotWithRemaining>, StoreError> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT s.id, s.start_time, s.end_time, s.capacity, \
             s.capacity::BIGINT - COUNT(b.id) FILTER (WHERE b.status = 'confirmed') AS remaining \
             FROM slots s LEFT JOIN bookings b ON b.slot_id = s.id",
        );
        if let Some((from, to)) = window {
            qb.push(" WHERE s.start_time >= ")
                .push_bind(from)
                .push(" AND s.start_time < ")
                .push_bind(to);
        }
        qb.push(" GROUP BY s.id ORDER BY s.start_time ASC, s.id ASC");
        let slots = qb
            .build_query_as::<SlotWithRemaining>()
            .fetch_all(&self.pool)
            .await?;
        Ok(slots)
    }

    async fn slot_attendees(&self, slot_id: i64) -> Result<Vec<Attendee>, StoreError> {
        let attendees = sqlx::query_as::<_, Attendee>(
            "SELECT b.id AS booking_id, u.id AS user_id, u.name, u.email, b.created_at \
             FROM bookings b JOIN users u ON u.id = b.user_id \
             WHERE b.slot_id = $1 AND b.status = 'confirmed' \
             ORDER BY u.name ASC",
        )
        .bind(slot_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(attendees)
    }

    async fn create_booking_if_capacity(
        &self,
        slot_id: i64,
        user_id: i64,
    ) -> Result<CapacityOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;
        // Lock the slot row for the rest of the transaction; concurrent
        // creation attempts for the same slot queue here.
        let slot: Option<(i32,)> =
            sqlx::query_as("SELECT capacity FROM slots WHERE id = $1 FOR UPDATE")
                .bind(slot_id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some((capacity,)) = slot else {
            return Ok(CapacityOutcome::SlotMissing);
        };
        let used: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM bookings WHERE slot_id = $1 AND status = 'confirmed'",
        )
        .bind(slot_id)
        .fetch_one(&mut *tx)
        .await?;
        if used >= capacity as i64 {
            return Ok(CapacityOutcome::Full);
        }
        let booking = sqlx::query_as::<_, Booking>(
            "INSERT INTO bookings (user_id, slot_id, status) VALUES ($1, $2, 'confirmed') \
             RETURNING id, user_id, slot_id, status, created_at",
        )
        .bind(user_id)
        .bind(slot_id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(CapacityOutcome::Created(booking))
    }

    async fn get_booking(&self, id: i64) -> Result<Option<Booking>, StoreError> {
        let booking = sqlx::query_as::<_, Booking>(
            "SELECT id, user_id, slot_id, status, created_at FROM bookings WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(booking)
    }

    async fn cancel_booking(&self, id: i64) -> Result<(), StoreError> {
        sqlx::query("UPDATE bookings SET status = 'canceled' WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_bookings(&self, filter: BookingFilter) -> Result<Vec<BookingView>, StoreError> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT b.id, b.user_id, b.slot_id, b.status, b.created_at, \
             s.start_time, s.end_time \
             FROM bookings b JOIN slots s ON s.id = b.slot_id WHERE 1 = 1",
        );
        if let Some(user_id) = filter.user_id {
            qb.push(" AND b.user_id = ").push_bind(user_id);
        }
        if filter.exclude_canceled {
            qb.push(" AND b.status <> 'canceled'");
        }
        if let Some(after) = filter.starting_after {
            qb.push(" AND s.start_time >= ").push_bind(after);
        }
        qb.push(" ORDER BY s.start_time DESC, b.id DESC");
        let bookings = qb
            .build_query_as::<BookingView>()
            .fetch_all(&self.pool)
            .await?;
        Ok(bookings)
    }

    async fn count_confirmed(&self, slot_id: i64) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM bookings WHERE slot_id = $1 AND status = 'confirmed'",
        )
        .bind(slot_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (name, email, password_hash, role) VALUES ($1, $2, $3, $4) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role)
        .fetch_one(&self.pool)
        .await
        .map_err(map_unique_violation)
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>, StoreError> {
        let user =
            sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn update_user(&self, id: i64, patch: UserPatch) -> Result<Option<User>, StoreError> {
        if patch.is_empty() {
            return self.get_user(id).await;
        }
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE users SET ");
        let mut fields = qb.separated(", ");
        if let Some(name) = &patch.name {
            fields.push("name = ").push_bind_unseparated(name);
        }
        if let Some(email) = &patch.email {
            fields.push("email = ").push_bind_unseparated(email);
        }
        if let Some(role) = patch.role {
            fields.push("role = ").push_bind_unseparated(role);
        }
        if let Some(hash) = &patch.password_hash {
            fields.push("password_hash = ").push_bind_unseparated(hash);
        }
        qb.push(" WHERE id = ").push_bind(id);
        qb.push(format!(" RETURNING {USER_COLUMNS}"));
        qb.build_query_as::<User>()
            .fetch_optional(&self.pool)
            .await
            .map_err(map_unique_violation)
    }

    async fn delete_user(&self, id: i64) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn count_admins(&self) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = 'admin'")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn set_paid(&self, user_id: i64, month: &str, paid: bool) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO payments (user_id, month, paid) VALUES ($1, $2, $3) \
             ON CONFLICT (user_id, month) DO UPDATE SET paid = EXCLUDED.paid",
        )
        .bind(user_id)
        .bind(month)
        .bind(paid)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn is_paid(&self, user_id: i64, month: &str) -> Result<bool, StoreError> {
        let paid: Option<bool> =
            sqlx::query_scalar("SELECT paid FROM payments WHERE user_id = $1 AND month = $2")
                .bind(user_id)
                .bind(month)
                .fetch_optional(&self.pool)
                .await?;
        Ok(paid.unwrap_or(false))
    }

    async fn month_payments(&self, month: &str) -> Result<Vec<(i64, bool)>, StoreError> {
        let rows: Vec<(i64, bool)> = sqlx::query_as(
            "SELECT u.id, COALESCE(p.paid, FALSE) \
             FROM users u LEFT JOIN payments p ON p.user_id = u.id AND p.month = $1 \
             ORDER BY u.name ASC, u.id ASC",
        )
        .bind(month)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_deadline(&self, month: &str) -> Result<Option<NaiveDate>, StoreError> {
        let deadline: Option<NaiveDate> =
            sqlx::query_scalar("SELECT deadline FROM payment_deadlines WHERE month = $1")
                .bind(month)
                .fetch_optional(&self.pool)
                .await?;
        Ok(deadline)
    }

    async fn set_deadline(&self, month: &str, deadline: NaiveDate) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO payment_deadlines (month, deadline) VALUES ($1, $2) \
             ON CONFLICT (month) DO UPDATE SET deadline = EXCLUDED.deadline",
        )
        .bind(month)
        .bind(deadline)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
