use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use hibiscus_core::repository::{BookingMark, BookingRepository, LegGuard};
use hibiscus_core::{
    Booking, BookingStatus, CoreResult, DispatchLeg, GeoPoint, Leg, PaymentStatus, TrackingStatus,
};
use serde::Serialize;
use serde_json::Value;
use sqlx::{PgPool, Postgres, Transaction};

use crate::database::{map_json_error, map_sqlx_error};

pub struct PgBookingRepository {
    pool: PgPool,
}

impl PgBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct DocRow {
    doc: Value,
}

impl DocRow {
    fn into_booking(self) -> CoreResult<Booking> {
        serde_json::from_value(self.doc).map_err(map_json_error)
    }
}

fn to_doc(booking: &Booking) -> CoreResult<Value> {
    serde_json::to_value(booking).map_err(map_json_error)
}

fn collect(rows: Vec<DocRow>) -> CoreResult<Vec<Booking>> {
    rows.into_iter().map(DocRow::into_booking).collect()
}

/// A single `jsonb_set` target inside the booking document
type FieldWrite = (Vec<String>, Value);

fn field<T: Serialize>(path: &[&str], value: T) -> CoreResult<FieldWrite> {
    let value = serde_json::to_value(value).map_err(map_json_error)?;
    Ok((path.iter().map(|p| p.to_string()).collect(), value))
}

fn mark_fields(mark: &BookingMark) -> CoreResult<Vec<FieldWrite>> {
    match mark {
        BookingMark::EmailSent(at) => Ok(vec![field(&["notifications", "last_email_sent"], at)?]),
        BookingMark::SmsSent(at) => Ok(vec![field(&["notifications", "last_sms_sent"], at)?]),
        BookingMark::ReminderSent(at) => Ok(vec![
            field(&["notifications", "reminder_sent"], true)?,
            field(&["notifications", "reminder_sent_at"], at)?,
        ]),
        BookingMark::CalendarEvent(id) => Ok(vec![field(&["calendar_event_id"], id)?]),
        BookingMark::CheckoutSession(id) => Ok(vec![field(&["payment", "checkout_session_id"], id)?]),
        BookingMark::PaymentLinkSent(at) => Ok(vec![field(&["payment", "payment_link_sent_at"], at)?]),
        BookingMark::Paid(at) => Ok(vec![
            field(&["status"], BookingStatus::Confirmed)?,
            field(&["payment_status"], PaymentStatus::Paid)?,
            field(&["payment", "paid_at"], at)?,
            field(&["updated_at"], at)?,
        ]),
    }
}

/// Apply each write in turn. False if the booking row is missing.
async fn write_fields(
    tx: &mut Transaction<'_, Postgres>,
    booking_id: &str,
    fields: Vec<FieldWrite>,
) -> CoreResult<bool> {
    for (path, value) in fields {
        let result = sqlx::query(
            "UPDATE bookings SET doc = jsonb_set(doc, $2::text[], $3::jsonb, true) WHERE id = $1",
        )
        .bind(booking_id)
        .bind(path)
        .bind(value)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Ok(false);
        }
    }
    Ok(true)
}

#[async_trait]
impl BookingRepository for PgBookingRepository {
    async fn insert(&self, booking: &Booking) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO bookings (id, booking_ref, booking_date, created_at, doc) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&booking.id)
        .bind(&booking.booking_ref)
        .bind(booking.date)
        .bind(booking.created_at)
        .bind(to_doc(booking)?)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn get(&self, id: &str) -> CoreResult<Option<Booking>> {
        let row = sqlx::query_as::<_, DocRow>("SELECT doc FROM bookings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.map(DocRow::into_booking).transpose()
    }

    async fn find_by_reference(&self, booking_ref: &str) -> CoreResult<Option<Booking>> {
        let row = sqlx::query_as::<_, DocRow>("SELECT doc FROM bookings WHERE booking_ref = $1")
            .bind(booking_ref)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.map(DocRow::into_booking).transpose()
    }

    async fn find_by_tracking_id(&self, tracking_id: &str) -> CoreResult<Option<Booking>> {
        let row = sqlx::query_as::<_, DocRow>(
            r#"
            SELECT doc FROM bookings
            WHERE doc -> 'legs' -> 'outbound' ->> 'tracking_id' = $1
               OR doc -> 'legs' -> 'return' ->> 'tracking_id' = $1
            LIMIT 1
            "#,
        )
        .bind(tracking_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        row.map(DocRow::into_booking).transpose()
    }

    async fn list(&self) -> CoreResult<Vec<Booking>> {
        let rows = sqlx::query_as::<_, DocRow>("SELECT doc FROM bookings ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        collect(rows)
    }

    async fn list_by_date(&self, date: NaiveDate) -> CoreResult<Vec<Booking>> {
        let rows = sqlx::query_as::<_, DocRow>(
            "SELECT doc FROM bookings WHERE booking_date = $1 ORDER BY doc ->> 'time'",
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        collect(rows)
    }

    async fn latest_reference(&self) -> CoreResult<Option<String>> {
        // Deleted bookings still own their reference so a restore cannot collide.
        let latest: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT booking_ref FROM (
                SELECT booking_ref, created_at FROM bookings
                UNION ALL
                SELECT booking_ref, created_at FROM deleted_bookings
            ) refs
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(latest.map(|(r,)| r))
    }

    async fn save(&self, booking: &Booking) -> CoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE bookings
            SET doc = $2::jsonb || jsonb_build_object(
                    'legs', COALESCE(doc -> 'legs', '{}'::jsonb),
                    'notifications', COALESCE(doc -> 'notifications', $2::jsonb -> 'notifications'),
                    'payment', COALESCE(doc -> 'payment', $2::jsonb -> 'payment'),
                    'calendar_event_id', COALESCE(doc -> 'calendar_event_id', 'null'::jsonb)
                ),
                booking_date = $3
            WHERE id = $1
            "#,
        )
        .bind(&booking.id)
        .bind(to_doc(booking)?)
        .bind(booking.date)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn apply_mark(&self, booking_id: &str, mark: &BookingMark) -> CoreResult<bool> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let applied = write_fields(&mut tx, booking_id, mark_fields(mark)?).await?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(applied)
    }

    async fn set_leg(&self, booking_id: &str, leg: Leg, value: &DispatchLeg) -> CoreResult<bool> {
        let leg_doc = serde_json::to_value(value).map_err(map_json_error)?;
        let result = sqlx::query(
            "UPDATE bookings SET doc = jsonb_set(doc, ARRAY['legs', $2::text], $3::jsonb, true) WHERE id = $1",
        )
        .bind(booking_id)
        .bind(leg.to_string())
        .bind(leg_doc)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_leg(
        &self,
        booking_id: &str,
        leg: Leg,
        guard: &LegGuard,
        value: &DispatchLeg,
    ) -> CoreResult<bool> {
        let leg_doc = serde_json::to_value(value).map_err(map_json_error)?;
        let result = sqlx::query(
            r#"
            UPDATE bookings
            SET doc = jsonb_set(doc, ARRAY['legs', $2::text], $3::jsonb, true)
            WHERE id = $1
              AND doc -> 'legs' -> $2::text ->> 'acceptance_token' = $4
              AND (
                  NOT $5
                  OR COALESCE(doc -> 'legs' -> $2::text -> 'driver_accepted', 'null'::jsonb) = 'null'::jsonb
              )
            "#,
        )
        .bind(booking_id)
        .bind(leg.to_string())
        .bind(leg_doc)
        .bind(&guard.expected_token)
        .bind(guard.require_unanswered)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_leg_tracking(
        &self,
        booking_id: &str,
        leg: Leg,
        tracking_id: Option<&str>,
        status: TrackingStatus,
        driver: Option<(&str, &str)>,
    ) -> CoreResult<bool> {
        let leg_name = leg.to_string();
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let ensured = sqlx::query(
            r#"
            UPDATE bookings
            SET doc = jsonb_set(doc, ARRAY['legs', $2::text], COALESCE(doc -> 'legs' -> $2::text, '{}'::jsonb), true)
            WHERE id = $1
            "#,
        )
        .bind(booking_id)
        .bind(&leg_name)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        if ensured.rows_affected() == 0 {
            return Ok(false);
        }

        let mut fields = vec![field(&["legs", leg_name.as_str(), "tracking_status"], status)?];
        if let Some(tracking_id) = tracking_id {
            fields.push(field(&["legs", leg_name.as_str(), "tracking_id"], tracking_id)?);
        }
        if let Some((driver_id, driver_name)) = driver {
            fields.push(field(&["legs", leg_name.as_str(), "driver_id"], driver_id)?);
            fields.push(field(&["legs", leg_name.as_str(), "driver_name"], driver_name)?);
        }
        let applied = write_fields(&mut tx, booking_id, fields).await?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(applied)
    }

    async fn record_driver_position(
        &self,
        booking_id: &str,
        location: &GeoPoint,
        eta_minutes: Option<i64>,
    ) -> CoreResult<bool> {
        let location_doc = serde_json::to_value(location).map_err(map_json_error)?;
        let eta_doc = serde_json::to_value(eta_minutes).map_err(map_json_error)?;
        let result = sqlx::query(
            r#"
            UPDATE bookings
            SET doc = jsonb_set(
                jsonb_set(doc, '{legs,outbound,driver_location}', $2::jsonb, true),
                '{legs,outbound,driver_eta_minutes}', $3::jsonb, true
            )
            WHERE id = $1 AND doc -> 'legs' ? 'outbound'
            "#,
        )
        .bind(booking_id)
        .bind(location_doc)
        .bind(eta_doc)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn soft_delete(
        &self,
        id: &str,
        deleted_by: &str,
        at: DateTime<Utc>,
    ) -> CoreResult<Option<Booking>> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let row = sqlx::query_as::<_, DocRow>("DELETE FROM bookings WHERE id = $1 RETURNING doc")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut booking = row.into_booking()?;
        booking.mark_deleted(deleted_by, at);

        sqlx::query(
            "INSERT INTO deleted_bookings (id, booking_ref, created_at, deleted_at, doc) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&booking.id)
        .bind(&booking.booking_ref)
        .bind(booking.created_at)
        .bind(at)
        .bind(to_doc(&booking)?)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(Some(booking))
    }

    async fn list_deleted(&self) -> CoreResult<Vec<Booking>> {
        let rows = sqlx::query_as::<_, DocRow>(
            "SELECT doc FROM deleted_bookings ORDER BY deleted_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        collect(rows)
    }

    async fn restore(&self, id: &str, at: DateTime<Utc>) -> CoreResult<Option<Booking>> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let row = sqlx::query_as::<_, DocRow>(
            "DELETE FROM deleted_bookings WHERE id = $1 RETURNING doc",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut booking = row.into_booking()?;
        booking.mark_restored(at);

        sqlx::query(
            "INSERT INTO bookings (id, booking_ref, booking_date, created_at, doc) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&booking.id)
        .bind(&booking.booking_ref)
        .bind(booking.date)
        .bind(booking.created_at)
        .bind(to_doc(&booking)?)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(Some(booking))
    }

    async fn purge(&self, id: &str) -> CoreResult<bool> {
        let result = sqlx::query("DELETE FROM deleted_bookings WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }
}
