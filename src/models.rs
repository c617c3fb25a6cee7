use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn is_admin(self) -> bool {
        self == Role::Admin
    }
}

/// Booking lifecycle. The transition confirmed -> canceled is one-way;
/// canceled rows are kept so the history stays auditable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum BookingStatus {
    Confirmed,
    Canceled,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// A bookable time interval. Slot boundaries are authored in local
/// wall-clock time, so they are stored without a zone.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Slot {
    pub id: i64,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub capacity: i32,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SlotWithRemaining {
    pub id: i64,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub capacity: i32,
    pub remaining: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Booking {
    pub id: i64,
    pub user_id: i64,
    pub slot_id: i64,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
}

/// A booking annotated with its slot's interval, for listings.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct BookingView {
    pub id: i64,
    pub user_id: i64,
    pub slot_id: i64,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Attendee {
    pub booking_id: i64,
    pub user_id: i64,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}
