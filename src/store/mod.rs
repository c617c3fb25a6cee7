//! Storage adapters. One trait, two realizations: Postgres (row-locking
//! transactions) and an in-memory store (single mutex). Both must satisfy
//! the same contract for `create_booking_if_capacity`: no two concurrent
//! calls for the same slot may both succeed when one seat remains.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use thiserror::Error;

use crate::models::{Attendee, Booking, BookingView, Role, Slot, SlotWithRemaining, User};

pub use memory::MemStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("email already exists")]
    EmailTaken,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Outcome of the atomic capacity check-and-insert.
#[derive(Debug)]
pub enum CapacityOutcome {
    Created(Booking),
    SlotMissing,
    Full,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub password_hash: Option<String>,
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.email.is_none()
            && self.role.is_none()
            && self.password_hash.is_none()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NewSlot {
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub capacity: i32,
}

/// Listing filter for bookings. `starting_after` compares the slot's start
/// time, which is how past bookings are hidden from regular users.
#[derive(Debug, Clone, Copy, Default)]
pub struct BookingFilter {
    pub user_id: Option<i64>,
    pub exclude_canceled: bool,
    pub starting_after: Option<NaiveDateTime>,
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    // Slot catalog
    async fn create_slot(&self, slot: NewSlot) -> Result<Slot, StoreError>;
    /// Bulk insert. Adapters chunk writes to their backend's batch ceiling;
    /// each chunk is all-or-nothing, the whole call is not.
    async fn insert_slots(&self, slots: &[NewSlot]) -> Result<u64, StoreError>;
    async fn get_slot(&self, id: i64) -> Result<Option<Slot>, StoreError>;
    /// Deletes a slot and every booking referencing it.
    async fn delete_slot(&self, id: i64) -> Result<(), StoreError>;
    async fn delete_all_slots(&self) -> Result<(), StoreError>;
    /// Slots with remaining capacity computed at read time, ascending by
    /// start time. `window` is a half-open local interval on start time.
    async fn list_slots(
        &self,
        window: Option<(NaiveDateTime, NaiveDateTime)>,
    ) -> Result<Vec<SlotWithRemaining>, StoreError>;
    async fn slot_attendees(&self, slot_id: i64) -> Result<Vec<Attendee>, StoreError>;

    // Booking ledger
    /// Atomic unit of the creation protocol: recount confirmed bookings for
    /// the slot and insert only while under capacity.
    async fn create_booking_if_capacity(
        &self,
        slot_id: i64,
        user_id: i64,
    ) -> Result<CapacityOutcome, StoreError>;
    async fn get_booking(&self, id: i64) -> Result<Option<Booking>, StoreError>;
    /// Marks a booking canceled; a no-op when already canceled or missing.
    async fn cancel_booking(&self, id: i64) -> Result<(), StoreError>;
    async fn list_bookings(&self, filter: BookingFilter) -> Result<Vec<BookingView>, StoreError>;
    async fn count_confirmed(&self, slot_id: i64) -> Result<i64, StoreError>;

    // User directory
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError>;
    async fn get_user(&self, id: i64) -> Result<Option<User>, StoreError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn list_users(&self) -> Result<Vec<User>, StoreError>;
    async fn update_user(&self, id: i64, patch: UserPatch) -> Result<Option<User>, StoreError>;
    async fn delete_user(&self, id: i64) -> Result<(), StoreError>;
    async fn count_admins(&self) -> Result<i64, StoreError>;

    // Payment ledger
    async fn set_paid(&self, user_id: i64, month: &str, paid: bool) -> Result<(), StoreError>;
    async fn is_paid(&self, user_id: i64, month: &str) -> Result<bool, StoreError>;
    /// `(user_id, paid)` for every user in the directory, for one month.
    async fn month_payments(&self, month: &str) -> Result<Vec<(i64, bool)>, StoreError>;
    async fn get_deadline(&self, month: &str) -> Result<Option<NaiveDate>, StoreError>;
    async fn set_deadline(&self, month: &str, deadline: NaiveDate) -> Result<(), StoreError>;
}
