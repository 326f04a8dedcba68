use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::Script;
use uuid::Uuid;

use super::{Fingerprint, IdempotencyLedger, LedgerError, LedgerState, Reservation};

// Each entry is a hash { record_id, state, kind } at `ledger:<fingerprint>`.
// Every operation is a Lua script so check-and-set happens server-side.

const RESERVE_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
  return redis.call('HMGET', KEYS[1], 'record_id', 'state')
end
redis.call('HSET', KEYS[1], 'record_id', ARGV[1], 'state', 'in_flight', 'kind', ARGV[2])
return false
"#;

const FINISH_SCRIPT: &str = r#"
if redis.call('HGET', KEYS[1], 'state') == 'in_flight' then
  redis.call('HSET', KEYS[1], 'state', ARGV[1])
end
return 1
"#;

const RELEASE_SCRIPT: &str = r#"
local state = redis.call('HGET', KEYS[1], 'state')
if state and state ~= 'completed' then
  redis.call('DEL', KEYS[1])
  return 1
end
return 0
"#;

const RELEASE_FAILED_SCRIPT: &str = r#"
local entry = redis.call('HMGET', KEYS[1], 'record_id', 'state')
if entry[1] == ARGV[1] and entry[2] == 'failed' then
  redis.call('DEL', KEYS[1])
  return 1
end
return 0
"#;

/// Ledger backed by Redis, for deployments that run several API replicas
/// against a shared Redis but want reservations off the primary database.
#[derive(Clone)]
pub struct RedisLedger {
    conn: MultiplexedConnection,
}

impl RedisLedger {
    pub async fn connect(client: &redis::Client) -> Result<Self, LedgerError> {
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self { conn })
    }

    fn key(fingerprint: &Fingerprint) -> String {
        format!("ledger:{}", fingerprint.as_str())
    }
}

#[async_trait]
impl IdempotencyLedger for RedisLedger {
    async fn reserve(
        &self,
        fingerprint: &Fingerprint,
        record_id: Uuid,
    ) -> Result<Reservation, LedgerError> {
        let mut conn = self.conn.clone();
        let existing: Option<Vec<String>> = Script::new(RESERVE_SCRIPT)
            .key(Self::key(fingerprint))
            .arg(record_id.to_string())
            .arg(fingerprint.kind())
            .invoke_async(&mut conn)
            .await?;

        match existing {
            None => Ok(Reservation::Acquired),
            Some(fields) => match fields.as_slice() {
                [record, state] => Ok(Reservation::AlreadyExists {
                    record_id: record
                        .parse()
                        .map_err(|e| LedgerError::Corrupt(format!("record_id: {e}")))?,
                    state: state.parse()?,
                }),
                _ => Err(LedgerError::Corrupt(format!(
                    "unexpected entry shape for {fingerprint}"
                ))),
            },
        }
    }

    async fn finish(
        &self,
        fingerprint: &Fingerprint,
        state: LedgerState,
    ) -> Result<(), LedgerError> {
        let mut conn = self.conn.clone();
        let _: i64 = Script::new(FINISH_SCRIPT)
            .key(Self::key(fingerprint))
            .arg(state.as_str())
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn release(&self, fingerprint: &Fingerprint) -> Result<bool, LedgerError> {
        let mut conn = self.conn.clone();
        let released: i64 = Script::new(RELEASE_SCRIPT)
            .key(Self::key(fingerprint))
            .invoke_async(&mut conn)
            .await?;
        Ok(released == 1)
    }

    async fn release_failed(
        &self,
        fingerprint: &Fingerprint,
        record_id: Uuid,
    ) -> Result<bool, LedgerError> {
        let mut conn = self.conn.clone();
        let released: i64 = Script::new(RELEASE_FAILED_SCRIPT)
            .key(Self::key(fingerprint))
            .arg(record_id.to_string())
            .invoke_async(&mut conn)
            .await?;
        Ok(released == 1)
    }
}
