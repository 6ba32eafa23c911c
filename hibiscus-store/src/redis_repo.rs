use async_trait::async_trait;
use hibiscus_core::repository::SessionStore;
use hibiscus_core::{CoreError, CoreResult, GeoPoint, SessionStatus, TrackingSession};
use redis::{AsyncCommands, RedisResult};
use std::collections::HashMap;
use tracing::info;

/// Sessions outlive any realistic trip but are not kept forever.
const SESSION_TTL_SECONDS: i64 = 12 * 60 * 60;

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    pub async fn ping(&self) -> RedisResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    pub async fn check_rate_limit(&self, key: &str, limit: i64, window_seconds: i64) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let (count,): (i64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire(key, window_seconds)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(count <= limit)
    }
}

/// Tracking sessions kept in Redis so they survive a restart.
///
/// Each session is a hash: the captured snapshot lives in `snapshot` and the
/// fields that change while driving are separate hash fields, so concurrent
/// location and ETA writes never clobber each other. The proximity flag is a
/// separate key flipped with `SET NX`.
#[derive(Clone)]
pub struct RedisSessionStore {
    client: redis::Client,
}

fn session_key(tracking_id: &str) -> String {
    format!("tracking:session:{}", tracking_id)
}

fn proximity_key(tracking_id: &str) -> String {
    format!("tracking:session:{}:proximity", tracking_id)
}

fn pair_key(booking_id: &str, driver_id: &str) -> String {
    format!("tracking:pair:{}:{}", booking_id, driver_id)
}

fn booking_key(booking_id: &str) -> String {
    format!("tracking:booking:{}", booking_id)
}

fn status_str(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::PendingAcceptance => "pending_acceptance",
        SessionStatus::Active => "active",
        SessionStatus::Arrived => "arrived",
    }
}

fn parse_status(raw: &str) -> SessionStatus {
    match raw {
        "active" => SessionStatus::Active,
        "arrived" => SessionStatus::Arrived,
        _ => SessionStatus::PendingAcceptance,
    }
}

fn redis_err(err: redis::RedisError) -> CoreError {
    CoreError::storage(err)
}

fn json_err(err: serde_json::Error) -> CoreError {
    CoreError::Storage(format!("corrupt tracking session: {}", err))
}

impl RedisSessionStore {
    pub fn new(client: &RedisClient) -> Self {
        Self {
            client: client.client.clone(),
        }
    }

    async fn conn(&self) -> CoreResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(redis_err)
    }

    async fn load(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        tracking_id: &str,
    ) -> CoreResult<Option<TrackingSession>> {
        let fields: HashMap<String, String> = conn
            .hgetall(session_key(tracking_id))
            .await
            .map_err(redis_err)?;
        let Some(snapshot) = fields.get("snapshot") else {
            return Ok(None);
        };

        let mut session: TrackingSession = serde_json::from_str(snapshot).map_err(json_err)?;
        if let Some(raw) = fields.get("location") {
            session.last_location = Some(serde_json::from_str::<GeoPoint>(raw).map_err(json_err)?);
        }
        if let Some(raw) = fields.get("eta") {
            session.current_eta_minutes = raw.parse().ok();
        }
        if let Some(raw) = fields.get("status") {
            session.status = parse_status(raw);
        }

        let claimed: bool = conn
            .exists(proximity_key(tracking_id))
            .await
            .map_err(redis_err)?;
        session.proximity_sms_sent = session.proximity_sms_sent || claimed;

        Ok(Some(session))
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn get(&self, tracking_id: &str) -> CoreResult<Option<TrackingSession>> {
        let mut conn = self.conn().await?;
        self.load(&mut conn, tracking_id).await
    }

    async fn put(&self, session: TrackingSession) -> CoreResult<()> {
        let mut conn = self.conn().await?;
        let key = session_key(&session.tracking_id);
        let snapshot = serde_json::to_string(&session).map_err(json_err)?;

        let mut pipe = redis::pipe();
        pipe.atomic()
            .del(&key)
            .ignore()
            .hset(&key, "snapshot", snapshot)
            .ignore()
            .hset(&key, "status", status_str(session.status))
            .ignore();
        if let Some(location) = &session.last_location {
            let raw = serde_json::to_string(location).map_err(json_err)?;
            pipe.hset(&key, "location", raw).ignore();
        }
        if let Some(eta) = session.current_eta_minutes {
            pipe.hset(&key, "eta", eta).ignore();
        }
        pipe.expire(&key, SESSION_TTL_SECONDS)
            .ignore()
            .set_ex(pair_key(&session.booking_id, &session.driver_id), &session.tracking_id, SESSION_TTL_SECONDS as u64)
            .ignore()
            .sadd(booking_key(&session.booking_id), &session.tracking_id)
            .ignore()
            .expire(booking_key(&session.booking_id), SESSION_TTL_SECONDS)
            .ignore();
        if session.proximity_sms_sent {
            pipe.set_ex(proximity_key(&session.tracking_id), "1", SESSION_TTL_SECONDS as u64)
                .ignore();
        }

        let (): () = pipe.query_async(&mut conn).await.map_err(redis_err)?;
        info!("Tracking session stored: {}", session.tracking_id);
        Ok(())
    }

    async fn delete(&self, tracking_id: &str) -> CoreResult<Option<TrackingSession>> {
        let mut conn = self.conn().await?;
        let Some(session) = self.load(&mut conn, tracking_id).await? else {
            return Ok(None);
        };

        let (): () = redis::pipe()
            .atomic()
            .del(session_key(tracking_id))
            .ignore()
            .del(proximity_key(tracking_id))
            .ignore()
            .del(pair_key(&session.booking_id, &session.driver_id))
            .ignore()
            .srem(booking_key(&session.booking_id), tracking_id)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(redis_err)?;

        Ok(Some(session))
    }

    async fn activate(&self, tracking_id: &str) -> CoreResult<bool> {
        let mut conn = self.conn().await?;
        let script = redis::Script::new(
            r#"
            if redis.call("HEXISTS", KEYS[1], "snapshot") == 0 then
                return 0
            end
            redis.call("HSET", KEYS[1], "status", "active")
            return 1
            "#,
        );
        let applied: i64 = script
            .key(session_key(tracking_id))
            .invoke_async(&mut conn)
            .await
            .map_err(redis_err)?;
        Ok(applied == 1)
    }

    async fn find_by_pair(
        &self,
        booking_id: &str,
        driver_id: &str,
    ) -> CoreResult<Option<TrackingSession>> {
        let mut conn = self.conn().await?;
        let tracking_id: Option<String> = conn
            .get(pair_key(booking_id, driver_id))
            .await
            .map_err(redis_err)?;
        match tracking_id {
            Some(id) => self.load(&mut conn, &id).await,
            None => Ok(None),
        }
    }

    async fn find_by_booking(&self, booking_id: &str) -> CoreResult<Vec<TrackingSession>> {
        let mut conn = self.conn().await?;
        let ids: Vec<String> = conn
            .smembers(booking_key(booking_id))
            .await
            .map_err(redis_err)?;

        let mut sessions = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(session) = self.load(&mut conn, &id).await? {
                sessions.push(session);
            }
        }
        Ok(sessions)
    }

    async fn record_location(
        &self,
        tracking_id: &str,
        location: GeoPoint,
    ) -> CoreResult<Option<TrackingSession>> {
        let mut conn = self.conn().await?;
        let key = session_key(tracking_id);
        let raw = serde_json::to_string(&location).map_err(json_err)?;

        // Only touch live sessions, and never demote an arrived one.
        let script = redis::Script::new(
            r#"
            if redis.call("HEXISTS", KEYS[1], "snapshot") == 0 then
                return 0
            end
            redis.call("HSET", KEYS[1], "location", ARGV[1])
            if redis.call("HGET", KEYS[1], "status") == "pending_acceptance" then
                redis.call("HSET", KEYS[1], "status", "active")
            end
            return 1
            "#,
        );
        let applied: i64 = script
            .key(&key)
            .arg(raw)
            .invoke_async(&mut conn)
            .await
            .map_err(redis_err)?;

        if applied == 0 {
            return Ok(None);
        }
        self.load(&mut conn, tracking_id).await
    }

    async fn record_eta(&self, tracking_id: &str, eta_minutes: i64) -> CoreResult<()> {
        let mut conn = self.conn().await?;
        let key = session_key(tracking_id);
        let exists: bool = conn.hexists(&key, "snapshot").await.map_err(redis_err)?;
        if exists {
            let (): () = conn
                .hset(&key, "eta", eta_minutes)
                .await
                .map_err(redis_err)?;
        }
        Ok(())
    }

    async fn claim_proximity(&self, tracking_id: &str) -> CoreResult<bool> {
        let mut conn = self.conn().await?;

        // SET NX: only the first caller gets "OK" back
        let result: Option<String> = redis::cmd("SET")
            .arg(proximity_key(tracking_id))
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(SESSION_TTL_SECONDS)
            .query_async(&mut conn)
            .await
            .map_err(redis_err)?;

        Ok(result.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            SessionStatus::PendingAcceptance,
            SessionStatus::Active,
            SessionStatus::Arrived,
        ] {
            assert_eq!(parse_status(status_str(status)), status);
        }
    }

    #[test]
    fn test_keys_are_namespaced() {
        assert_eq!(session_key("t1"), "tracking:session:t1");
        assert_eq!(proximity_key("t1"), "tracking:session:t1:proximity");
        assert_eq!(pair_key("b1", "d1"), "tracking:pair:b1:d1");
    }
}
