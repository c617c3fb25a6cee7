//! In-memory adapter. All state lives behind one async mutex, so every
//! operation is a single serialized unit; the capacity check-and-insert is
//! therefore strictly serializable, which is stronger than the best-effort
//! recount the original document-store backend offered.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use tokio::sync::Mutex;

use crate::models::{
    Attendee, Booking, BookingStatus, BookingView, Slot, SlotWithRemaining, User,
};

use super::{BookingFilter, BookingStore, CapacityOutcome, NewSlot, NewUser, StoreError, UserPatch};

#[derive(Default)]
struct MemInner {
    next_id: i64,
    users: HashMap<i64, User>,
    slots: HashMap<i64, Slot>,
    bookings: HashMap<i64, Booking>,
    payments: HashMap<(i64, String), bool>,
    deadlines: HashMap<String, NaiveDate>,
}

impl MemInner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn confirmed_count(&self, slot_id: i64) -> i64 {
        self.bookings
            .values()
            .filter(|b| b.slot_id == slot_id && b.status == BookingStatus::Confirmed)
            .count() as i64
    }
}

#[derive(Default)]
pub struct MemStore {
    inner: Mutex<MemInner>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookingStore for MemStore {
    async fn create_slot(&self, slot: NewSlot) -> Result<Slot, StoreError> {
        let mut inner = self.inner.lock().await;
        let id = inner.next_id();
        let slot = Slot {
            id,
            start_time: slot.start_time,
            end_time: slot.end_time,
            capacity: slot.capacity,
        };
        inner.slots.insert(id, slot.clone());
        Ok(slot)
    }

    async fn insert_slots(&self, slots: &[NewSlot]) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().await;
        for slot in slots {
            let id = inner.next_id();
            inner.slots.insert(
                id,
                Slot {
                    id,
                    start_time: slot.start_time,
                    end_time: slot.end_time,
                    capacity: slot.capacity,
                },
            );
        }
        Ok(slots.len() as u64)
    }

    async fn get_slot(&self, id: i64) -> Result<Option<Slot>, StoreError> {
        Ok(self.inner.lock().await.slots.get(&id).cloned())
    }

    async fn delete_slot(&self, id: i64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.slots.remove(&id);
        inner.bookings.retain(|_, b| b.slot_id != id);
        Ok(())
    }

    async fn delete_all_slots(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.slots.clear();
        inner.bookings.clear();
        Ok(())
    }

    async fn list_slots(
        &self,
        window: Option<(NaiveDateTime, NaiveDateTime)>,
    ) -> Result<Vec<SlotWithRemaining>, StoreError> {
        let inner = self.inner.lock().await;
        let mut out: Vec<SlotWithRemaining> = inner
            .slots
            .values()
            .filter(|s| match window {
                Some((from, to)) => s.start_time >= from && s.start_time < to,
                None => true,
            })
            .map(|s| SlotWithRemaining {
                id: s.id,
                start_time: s.start_time,
                end_time: s.end_time,
                capacity: s.capacity,
                remaining: s.capacity as i64 - inner.confirmed_count(s.id),
            })
            .collect();
        out.sort_by(|a, b| (a.start_time, a.id).cmp(&(b.start_time, b.id)));
        Ok(out)
    }

    async fn slot_attendees(&self, slot_id: i64) -> Result<Vec<Attendee>, StoreError> {
        let inner = self.inner.lock().await;
        let mut out: Vec<Attendee> = inner
            .bookings
            .values()
            .filter(|b| b.slot_id == slot_id && b.status == BookingStatus::Confirmed)
            .filter_map(|b| {
                let user = inner.users.get(&b.user_id)?;
                Some(Attendee {
                    booking_id: b.id,
                    user_id: user.id,
                    name: user.name.clone(),
                    email: user.email.clone(),
                    created_at: b.created_at,
                })
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn create_booking_if_capacity(
        &self,
        slot_id: i64,
        user_id: i64,
    ) -> Result<CapacityOutcome, StoreError> {
        // Count and insert under the same lock guard.
        let mut inner = self.inner.lock().await;
        let Some(slot) = inner.slots.get(&slot_id) else {
            return Ok(CapacityOutcome::SlotMissing);
        };
        let capacity = slot.capacity as i64;
        if inner.confirmed_count(slot_id) >= capacity {
            return Ok(CapacityOutcome::Full);
        }
        let id = inner.next_id();
        let booking = Booking {
            id,
            user_id,
            slot_id,
            status: BookingStatus::Confirmed,
            created_at: Utc::now(),
        };
        inner.bookings.insert(id, booking.clone());
        Ok(CapacityOutcome::Created(booking))
    }

    async fn get_booking(&self, id: i64) -> Result<Option<Booking>, StoreError> {
        Ok(self.inner.lock().await.bookings.get(&id).cloned())
    }

    async fn cancel_booking(&self, id: i64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(b) = inner.bookings.get_mut(&id) {
            b.status = BookingStatus::Canceled;
        }
        Ok(())
    }

    async fn list_bookings(&self, filter: BookingFilter) -> Result<Vec<BookingView>, StoreError> {
        let inner = self.inner.lock().await;
        let mut out: Vec<BookingView> = inner
            .bookings
            .values()
            .filter(|b| filter.user_id.map_or(true, |uid| b.user_id == uid))
            .filter(|b| !(filter.exclude_canceled && b.status == BookingStatus::Canceled))
            .filter_map(|b| {
                // A booking whose slot is gone is skipped rather than
                // surfaced half-formed.
                let slot = inner.slots.get(&b.slot_id)?;
                Some(BookingView {
                    id: b.id,
                    user_id: b.user_id,
                    slot_id: b.slot_id,
                    status: b.status,
                    created_at: b.created_at,
                    start_time: slot.start_time,
                    end_time: slot.end_time,
                })
            })
            .filter(|v| filter.starting_after.map_or(true, |t| v.start_time >= t))
            .collect();
        out.sort_by(|a, b| (b.start_time, b.id).cmp(&(a.start_time, a.id)));
        Ok(out)
    }

    async fn count_confirmed(&self, slot_id: i64) -> Result<i64, StoreError> {
        Ok(self.inner.lock().await.confirmed_count(slot_id))
    }

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::EmailTaken);
        }
        let id = inner.next_id();
        let user = User {
            id,
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            created_at: Utc::now(),
        };
        inner.users.insert(id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>, StoreError> {
        Ok(self.inner.lock().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let inner = self.inner.lock().await;
        let mut out: Vec<User> = inner.users.values().cloned().collect();
        out.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(out)
    }

    async fn update_user(&self, id: i64, patch: UserPatch) -> Result<Option<User>, StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(email) = &patch.email {
            if inner.users.values().any(|u| u.id != id && &u.email == email) {
                return Err(StoreError::EmailTaken);
            }
        }
        let Some(user) = inner.users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = patch.name {
            user.name = name;
        }
        if let Some(email) = patch.email {
            user.email = email;
        }
        if let Some(role) = patch.role {
            user.role = role;
        }
        if let Some(hash) = patch.password_hash {
            user.password_hash = hash;
        }
        Ok(Some(user.clone()))
    }

    async fn delete_user(&self, id: i64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.users.remove(&id);
        inner.bookings.retain(|_, b| b.user_id != id);
        inner.payments.retain(|(uid, _), _| *uid != id);
        Ok(())
    }

    async fn count_admins(&self) -> Result<i64, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .users
            .values()
            .filter(|u| u.role.is_admin())
            .count() as i64)
    }

    async fn set_paid(&self, user_id: i64, month: &str, paid: bool) -> Result<(), StoreError> {
        self.inner
            .lock()
            .await
            .payments
            .insert((user_id, month.to_string()), paid);
        Ok(())
    }

    async fn is_paid(&self, user_id: i64, month: &str) -> Result<bool, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .payments
            .get(&(user_id, month.to_string()))
            .copied()
            .unwrap_or(false))
    }

    async fn month_payments(&self, month: &str) -> Result<Vec<(i64, bool)>, StoreError> {
        let inner = self.inner.lock().await;
        let mut users: Vec<&User> = inner.users.values().collect();
        users.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(users
            .into_iter()
            .map(|u| {
                let paid = inner
                    .payments
                    .get(&(u.id, month.to_string()))
                    .copied()
                    .unwrap_or(false);
                (u.id, paid)
            })
            .collect())
    }

    async fn get_deadline(&self, month: &str) -> Result<Option<NaiveDate>, StoreError> {
        Ok(self.inner.lock().await.deadlines.get(month).copied())
    }

    async fn set_deadline(&self, month: &str, deadline: NaiveDate) -> Result<(), StoreError> {
        self.inner
            .lock()
            .await
            .deadlines
            .insert(month.to_string(), deadline);
        Ok(())
    }
}
