//! The booking core: the capacity/payment-gated creation protocol,
//! cancellation, listing visibility, and bulk slot generation. Everything
//! here is storage-agnostic; the atomicity of the capacity check lives in
//! the adapter behind [`BookingStore`].

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};

use crate::auth::Claims;
use crate::errors::ApiError;
use crate::models::{Booking, BookingView};
use crate::store::{BookingFilter, BookingStore, CapacityOutcome, NewSlot};
use crate::timeutil;

#[derive(Debug, Clone)]
pub struct BulkGeneration {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub weekdays: Vec<u8>,
    pub time_start: NaiveTime,
    pub time_end: NaiveTime,
    pub slot_minutes: i64,
    pub capacity: i32,
}

#[derive(Clone)]
pub struct BookingService {
    store: Arc<dyn BookingStore>,
}

impl BookingService {
    pub fn new(store: Arc<dyn BookingStore>) -> Self {
        Self { store }
    }

    pub async fn create_booking(&self, actor: &Claims, slot_id: i64) -> Result<Booking, ApiError> {
        self.create_booking_at(actor, slot_id, Local::now().naive_local())
            .await
    }

    /// The creation protocol with an explicit "now", so policy decisions are
    /// reproducible: resolve slot, apply the payment gate for non-admins,
    /// then atomically recount and insert.
    pub async fn create_booking_at(
        &self,
        actor: &Claims,
        slot_id: i64,
        now: NaiveDateTime,
    ) -> Result<Booking, ApiError> {
        let slot = self
            .store
            .get_slot(slot_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("slot not found".to_string()))?;

        if !actor.role.is_admin() {
            // The gate is keyed by the month the slot occurs in, local
            // wall-clock, not by the month the request is made in.
            let month = timeutil::month_key(slot.start_time);
            if !self.store.is_paid(actor.id, &month).await? {
                match self.store.get_deadline(&month).await? {
                    // Strict by default: a month without a configured
                    // deadline blocks unpaid users immediately.
                    None => return Err(ApiError::PaymentRequired),
                    // Date-only comparison; the deadline day itself is
                    // already overdue.
                    Some(deadline) if now.date() >= deadline => {
                        return Err(ApiError::PaymentOverdue)
                    }
                    Some(_) => {}
                }
            }
        }

        match self.store.create_booking_if_capacity(slot_id, actor.id).await? {
            CapacityOutcome::Created(booking) => Ok(booking),
            CapacityOutcome::SlotMissing => {
                Err(ApiError::NotFound("slot not found".to_string()))
            }
            CapacityOutcome::Full => Err(ApiError::Conflict("slot is full".to_string())),
        }
    }

    /// Cancellation is idempotent: a missing booking is treated as already
    /// canceled so client retries stay trivial.
    pub async fn cancel_booking(&self, actor: &Claims, booking_id: i64) -> Result<(), ApiError> {
        let Some(booking) = self.store.get_booking(booking_id).await? else {
            return Ok(());
        };
        if !actor.role.is_admin() && booking.user_id != actor.id {
            return Err(ApiError::Forbidden(
                "only the owner or an admin may cancel a booking".to_string(),
            ));
        }
        self.store.cancel_booking(booking_id).await?;
        Ok(())
    }

    pub async fn list_bookings(&self, actor: &Claims) -> Result<Vec<BookingView>, ApiError> {
        self.list_bookings_at(actor, Local::now().naive_local())
            .await
    }

    /// Admins see everything; regular users see their own non-canceled
    /// bookings whose slot has not started yet.
    pub async fn list_bookings_at(
        &self,
        actor: &Claims,
        now: NaiveDateTime,
    ) -> Result<Vec<BookingView>, ApiError> {
        let filter = if actor.role.is_admin() {
            BookingFilter::default()
        } else {
            BookingFilter {
                user_id: Some(actor.id),
                exclude_canceled: true,
                starting_after: Some(now),
            }
        };
        Ok(self.store.list_bookings(filter).await?)
    }

    /// Expands a weekly template into concrete slots and bulk-inserts them.
    /// An empty expansion is a zero count, not an error.
    pub async fn generate_slots(&self, params: &BulkGeneration) -> Result<u64, ApiError> {
        if params.end_date < params.start_date {
            return Err(ApiError::Validation(
                "end_date must not precede start_date".to_string(),
            ));
        }
        if params.weekdays.is_empty() {
            return Err(ApiError::Validation(
                "at least one weekday is required".to_string(),
            ));
        }
        if params.weekdays.iter().any(|w| *w > 6) {
            return Err(ApiError::Validation(
                "weekdays must be in the range 0-6".to_string(),
            ));
        }
        if params.slot_minutes <= 0 || params.slot_minutes > 24 * 60 {
            return Err(ApiError::Validation(
                "slot_minutes must be between 1 and 1440".to_string(),
            ));
        }
        if params.capacity <= 0 {
            return Err(ApiError::Validation("capacity must be positive".to_string()));
        }

        let wanted: HashSet<u8> = params.weekdays.iter().copied().collect();
        let mut slots = Vec::new();
        let mut day = params.start_date;
        while day <= params.end_date {
            if wanted.contains(&timeutil::weekday_index(day)) {
                for (start, end) in
                    timeutil::tile_day(day, params.time_start, params.time_end, params.slot_minutes)
                {
                    slots.push(NewSlot {
                        start_time: start,
                        end_time: end,
                        capacity: params.capacity,
                    });
                }
            }
            day = day
                .succ_opt()
                .ok_or_else(|| ApiError::Validation("date range out of bounds".to_string()))?;
        }

        if slots.is_empty() {
            return Ok(0);
        }
        Ok(self.store.insert_slots(&slots).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BookingStatus, Role};
    use crate::store::{MemStore, NewUser};

    fn claims(id: i64, role: Role) -> Claims {
        Claims {
            id,
            role,
            name: format!("user-{id}"),
            email: format!("user-{id}@example.com"),
            exp: 0,
        }
    }

    fn dt(s: &str) -> NaiveDateTime {
        timeutil::parse_local_datetime(s).unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        timeutil::parse_date(s).unwrap()
    }

    struct Fixture {
        store: Arc<MemStore>,
        service: BookingService,
    }

    impl Fixture {
        fn new() -> Self {
            let store = Arc::new(MemStore::new());
            let service = BookingService::new(store.clone());
            Fixture { store, service }
        }

        async fn user(&self, role: Role) -> Claims {
            let user = self
                .store
                .create_user(NewUser {
                    name: "Ana".to_string(),
                    email: format!("u{}@example.com", rand_suffix(&self.store).await),
                    password_hash: "x".to_string(),
                    role,
                })
                .await
                .unwrap();
            claims(user.id, role)
        }

        async fn slot(&self, start: &str, end: &str, capacity: i32) -> i64 {
            self.store
                .create_slot(NewSlot {
                    start_time: dt(start),
                    end_time: dt(end),
                    capacity,
                })
                .await
                .unwrap()
                .id
        }

        async fn pay(&self, user: &Claims, month: &str) {
            self.store.set_paid(user.id, month, true).await.unwrap();
        }
    }

    // Unique-enough email suffixes without pulling in a rand dependency.
    async fn rand_suffix(store: &MemStore) -> i64 {
        store.list_users().await.unwrap().len() as i64 + 1
    }

    const NOW: &str = "2025-03-01T12:00";

    #[tokio::test]
    async fn admin_books_without_payment_records() {
        let fx = Fixture::new();
        let admin = fx.user(Role::Admin).await;
        let slot = fx.slot("2025-03-14T09:00", "2025-03-14T09:30", 2).await;

        let booking = fx
            .service
            .create_booking_at(&admin, slot, dt(NOW))
            .await
            .unwrap();
        assert_eq!(booking.status, BookingStatus::Confirmed);
        assert_eq!(booking.slot_id, slot);
    }

    #[tokio::test]
    async fn unpaid_user_without_deadline_is_rejected() {
        let fx = Fixture::new();
        let user = fx.user(Role::User).await;
        let slot = fx.slot("2025-03-14T09:00", "2025-03-14T09:30", 2).await;

        let err = fx
            .service
            .create_booking_at(&user, slot, dt(NOW))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::PaymentRequired));

        // The identical call as admin succeeds.
        let admin = fx.user(Role::Admin).await;
        fx.service
            .create_booking_at(&admin, slot, dt(NOW))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn paid_user_passes_the_gate() {
        let fx = Fixture::new();
        let user = fx.user(Role::User).await;
        let slot = fx.slot("2025-03-14T09:00", "2025-03-14T09:30", 1).await;
        fx.pay(&user, "2025-03").await;

        fx.service
            .create_booking_at(&user, slot, dt(NOW))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn deadline_grace_period_is_date_only() {
        let fx = Fixture::new();
        let user = fx.user(Role::User).await;
        let slot = fx.slot("2025-03-20T09:00", "2025-03-20T09:30", 5).await;
        fx.store
            .set_deadline("2025-03", date("2025-03-15"))
            .await
            .unwrap();

        // The day before the deadline still books, even unpaid.
        fx.service
            .create_booking_at(&user, slot, dt("2025-03-14T23:59"))
            .await
            .unwrap();

        // On the deadline day and after, unpaid booking is blocked.
        let err = fx
            .service
            .create_booking_at(&user, slot, dt("2025-03-15T00:00"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::PaymentOverdue));
        let err = fx
            .service
            .create_booking_at(&user, slot, dt("2025-03-16T10:00"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::PaymentOverdue));
    }

    #[tokio::test]
    async fn gate_uses_the_slot_month_not_the_booking_month() {
        let fx = Fixture::new();
        let user = fx.user(Role::User).await;
        // Slot in April, paid only for March.
        let slot = fx.slot("2025-04-02T09:00", "2025-04-02T09:30", 2).await;
        fx.pay(&user, "2025-03").await;

        let err = fx
            .service
            .create_booking_at(&user, slot, dt(NOW))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::PaymentRequired));

        fx.pay(&user, "2025-04").await;
        fx.service
            .create_booking_at(&user, slot, dt(NOW))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn missing_slot_is_not_found() {
        let fx = Fixture::new();
        let admin = fx.user(Role::Admin).await;
        let err = fx
            .service
            .create_booking_at(&admin, 9999, dt(NOW))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn capacity_is_never_exceeded_under_concurrency() {
        let fx = Fixture::new();
        let admin = fx.user(Role::Admin).await;
        let capacity = 3;
        let slot = fx
            .slot("2025-03-14T09:00", "2025-03-14T09:30", capacity)
            .await;

        let mut handles = Vec::new();
        for _ in 0..(capacity + 2) {
            let service = fx.service.clone();
            let actor = admin.clone();
            handles.push(tokio::spawn(async move {
                service.create_booking_at(&actor, slot, dt(NOW)).await
            }));
        }
        let mut ok = 0;
        let mut full = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(ApiError::Conflict(_)) => full += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(ok, capacity);
        assert_eq!(full, 2);
        assert_eq!(
            fx.store.count_confirmed(slot).await.unwrap(),
            capacity as i64
        );
    }

    #[tokio::test]
    async fn cancel_frees_exactly_one_seat() {
        let fx = Fixture::new();
        let admin = fx.user(Role::Admin).await;
        let capacity = 2;
        let slot = fx
            .slot("2025-03-14T09:00", "2025-03-14T09:30", capacity)
            .await;

        let first = fx
            .service
            .create_booking_at(&admin, slot, dt(NOW))
            .await
            .unwrap();
        fx.service
            .create_booking_at(&admin, slot, dt(NOW))
            .await
            .unwrap();
        let err = fx
            .service
            .create_booking_at(&admin, slot, dt(NOW))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));

        fx.service.cancel_booking(&admin, first.id).await.unwrap();
        fx.service
            .create_booking_at(&admin, slot, dt(NOW))
            .await
            .unwrap();
        assert_eq!(
            fx.store.count_confirmed(slot).await.unwrap(),
            capacity as i64
        );
    }

    #[tokio::test]
    async fn cancellation_is_idempotent_and_owner_scoped() {
        let fx = Fixture::new();
        let owner = fx.user(Role::User).await;
        let stranger = fx.user(Role::User).await;
        let admin = fx.user(Role::Admin).await;
        let slot = fx.slot("2025-03-14T09:00", "2025-03-14T09:30", 3).await;
        fx.pay(&owner, "2025-03").await;

        let booking = fx
            .service
            .create_booking_at(&owner, slot, dt(NOW))
            .await
            .unwrap();

        // A stranger may not cancel someone else's booking.
        let err = fx
            .service
            .cancel_booking(&stranger, booking.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));

        // Owner cancel, repeated cancel, and cancel of a missing id all
        // succeed quietly.
        fx.service.cancel_booking(&owner, booking.id).await.unwrap();
        fx.service.cancel_booking(&owner, booking.id).await.unwrap();
        fx.service.cancel_booking(&admin, 424242).await.unwrap();

        let stored = fx.store.get_booking(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Canceled);
    }

    #[tokio::test]
    async fn remaining_counts_only_confirmed_bookings() {
        let fx = Fixture::new();
        let admin = fx.user(Role::Admin).await;
        let slot = fx.slot("2025-03-14T09:00", "2025-03-14T09:30", 5).await;

        let mut ids = Vec::new();
        for _ in 0..5 {
            ids.push(
                fx.service
                    .create_booking_at(&admin, slot, dt(NOW))
                    .await
                    .unwrap()
                    .id,
            );
        }
        fx.service.cancel_booking(&admin, ids[0]).await.unwrap();
        fx.service.cancel_booking(&admin, ids[1]).await.unwrap();

        let slots = fx.store.list_slots(None).await.unwrap();
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].capacity, 5);
        assert_eq!(slots[0].remaining, 2);
    }

    #[tokio::test]
    async fn listing_hides_past_and_canceled_from_users_but_not_admins() {
        let fx = Fixture::new();
        let user = fx.user(Role::User).await;
        let admin = fx.user(Role::Admin).await;
        fx.pay(&user, "2025-03").await;

        let past = fx.slot("2025-03-01T09:00", "2025-03-01T09:30", 3).await;
        let future = fx.slot("2025-03-20T09:00", "2025-03-20T09:30", 3).await;

        let past_booking = fx
            .service
            .create_booking_at(&user, past, dt("2025-02-28T12:00"))
            .await
            .unwrap();
        let future_booking = fx
            .service
            .create_booking_at(&user, future, dt(NOW))
            .await
            .unwrap();
        let canceled = fx
            .service
            .create_booking_at(&user, future, dt(NOW))
            .await
            .unwrap();
        fx.service.cancel_booking(&user, canceled.id).await.unwrap();

        let now = dt("2025-03-10T12:00");
        let mine = fx.service.list_bookings_at(&user, now).await.unwrap();
        let mine_ids: Vec<i64> = mine.iter().map(|b| b.id).collect();
        assert_eq!(mine_ids, vec![future_booking.id]);

        let all = fx.service.list_bookings_at(&admin, now).await.unwrap();
        let all_ids: Vec<i64> = all.iter().map(|b| b.id).collect();
        assert!(all_ids.contains(&past_booking.id));
        assert!(all_ids.contains(&future_booking.id));
        assert!(all_ids.contains(&canceled.id));
    }

    #[tokio::test]
    async fn bulk_generation_tiles_and_rejects_bad_params() {
        let fx = Fixture::new();
        let nine = timeutil::parse_time("09:00").unwrap();

        // 2025-03-17 is a Monday; Mon/Wed over two weeks -> 4 days.
        let params = BulkGeneration {
            start_date: date("2025-03-17"),
            end_date: date("2025-03-28"),
            weekdays: vec![1, 3],
            time_start: nine,
            time_end: timeutil::parse_time("11:00").unwrap(),
            slot_minutes: 30,
            capacity: 2,
        };
        let created = fx.service.generate_slots(&params).await.unwrap();
        assert_eq!(created, 4 * 4);

        let empty_window = BulkGeneration {
            time_end: nine,
            ..params.clone()
        };
        assert_eq!(fx.service.generate_slots(&empty_window).await.unwrap(), 0);

        let trailing = BulkGeneration {
            start_date: date("2025-03-17"),
            end_date: date("2025-03-17"),
            weekdays: vec![1],
            time_start: nine,
            time_end: timeutil::parse_time("09:45").unwrap(),
            slot_minutes: 30,
            capacity: 1,
        };
        assert_eq!(fx.service.generate_slots(&trailing).await.unwrap(), 1);

        let inverted = BulkGeneration {
            start_date: date("2025-03-28"),
            end_date: date("2025-03-17"),
            ..params.clone()
        };
        assert!(matches!(
            fx.service.generate_slots(&inverted).await,
            Err(ApiError::Validation(_))
        ));

        let no_weekdays = BulkGeneration {
            weekdays: vec![],
            ..params.clone()
        };
        assert!(matches!(
            fx.service.generate_slots(&no_weekdays).await,
            Err(ApiError::Validation(_))
        ));

        let zero_step = BulkGeneration {
            slot_minutes: 0,
            ..params.clone()
        };
        assert!(matches!(
            fx.service.generate_slots(&zero_step).await,
            Err(ApiError::Validation(_))
        ));

        let zero_capacity = BulkGeneration {
            capacity: 0,
            ..params
        };
        assert!(matches!(
            fx.service.generate_slots(&zero_capacity).await,
            Err(ApiError::Validation(_))
        ));
    }
}
