use std::{collections::HashSet, sync::Mutex, time::Duration};

use redis::Commands;

use crate::{config::RedisConfig, storage::shared::KvBackend, Result};

/// [`KvBackend`] talking to a Redis server (6.2 or newer, `GETDEL` is required).
///
/// A single connection is opened lazily and reopened after connection errors.
pub struct RedisBackend {
    client: redis::Client,
    connection: Mutex<Option<redis::Connection>>,
}

impl RedisBackend {
    /// Create a backend for the server described by `config`. Does not connect yet.
    pub fn new(config: &RedisConfig) -> Result<RedisBackend> {
        let client = redis::Client::open(config.url())?;
        Ok(RedisBackend {
            client,
            connection: Mutex::new(None),
        })
    }

    fn with_connection<T>(
        &self,
        f: impl FnOnce(&mut redis::Connection) -> redis::RedisResult<T>,
    ) -> Result<T> {
        let mut slot = self
            .connection
            .lock()
            .expect("thread holding redis connection lock should not panic");

        let mut connection = match slot.take() {
            Some(connection) => connection,
            None => {
                log::debug!(target: "splitio", "opening redis connection");
                self.client.get_connection()?
            }
        };

        let result = f(&mut connection);
        match &result {
            Err(err) if err.is_connection_dropped() || err.is_io_error() => {
                log::warn!(target: "splitio", "redis connection lost: {err}");
            }
            _ => *slot = Some(connection),
        }
        Ok(result?)
    }
}

/// Escape glob metacharacters so `prefix` is matched literally by `SCAN MATCH`.
fn glob_escape(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('*');
    escaped
}

impl KvBackend for RedisBackend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_connection(|conn| redis::cmd("GET").arg(key).query(conn))
    }

    fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        self.with_connection(|conn| redis::cmd("MGET").arg(keys).query(conn))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.with_connection(|conn| redis::cmd("SET").arg(key).arg(value).query(conn))
    }

    fn del(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        self.with_connection(|conn| redis::cmd("DEL").arg(keys).query(conn))
    }

    fn take(&self, key: &str) -> Result<Option<String>> {
        self.with_connection(|conn| redis::cmd("GETDEL").arg(key).query(conn))
    }

    fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
        self.with_connection(|conn| redis::cmd("INCRBY").arg(key).arg(delta).query(conn))
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let pattern = glob_escape(prefix);
        self.with_connection(|conn| {
            let keys: HashSet<String> = conn.scan_match::<_, String>(&pattern)?.collect();
            Ok(keys.into_iter().collect())
        })
    }

    fn push_back(&self, key: &str, values: &[String]) -> Result<usize> {
        self.with_connection(|conn| redis::cmd("RPUSH").arg(key).arg(values).query(conn))
    }

    fn pop_front(&self, key: &str, n: usize) -> Result<Vec<String>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        self.with_connection(|conn| {
            let (values,): (Vec<String>,) = redis::pipe()
                .atomic()
                .cmd("LRANGE")
                .arg(key)
                .arg(0)
                .arg(n as i64 - 1)
                .cmd("LTRIM")
                .arg(key)
                .arg(n as i64)
                .arg(-1)
                .ignore()
                .query(conn)?;
            Ok(values)
        })
    }

    fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        self.with_connection(|conn| {
            redis::cmd("EXPIRE")
                .arg(key)
                .arg(ttl.as_secs().max(1))
                .query(conn)
        })
    }

    fn replace_set(&self, key: &str, members: &HashSet<String>) -> Result<()> {
        self.with_connection(|conn| {
            let mut pipe = redis::pipe();
            pipe.atomic().cmd("DEL").arg(key).ignore();
            if !members.is_empty() {
                pipe.cmd("SADD").arg(key).arg(members).ignore();
            }
            pipe.query(conn)
        })
    }

    fn set_members(&self, key: &str) -> Result<HashSet<String>> {
        self.with_connection(|conn| redis::cmd("SMEMBERS").arg(key).query(conn))
    }

    fn set_contains(&self, key: &str, member: &str) -> Result<bool> {
        self.with_connection(|conn| redis::cmd("SISMEMBER").arg(key).arg(member).query(conn))
    }
}

#[cfg(test)]
mod tests {
    use super::glob_escape;

    #[test]
    fn escapes_glob_characters() {
        assert_eq!(glob_escape("app.SPLITIO.split."), "app.SPLITIO.split.*");
        assert_eq!(glob_escape("a*b?[c]"), "a\\*b\\?\\[c\\]*");
    }
}
