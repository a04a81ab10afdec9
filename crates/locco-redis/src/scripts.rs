//! Lua scripts run atomically on the server

use std::sync::LazyLock;

use redis::Script;

/// Delete `KEYS[1]` only while it holds `ARGV[1]`; returns 1 or 0
pub const RELEASE_LOCK: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Reset the TTL of `KEYS[1]` to `ARGV[2]` ms only while it holds `ARGV[1]`
pub const EXTEND_LOCK: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    redis.call("SET", KEYS[1], ARGV[1], "PX", ARGV[2])
    return 1
else
    return 0
end
"#;

pub(crate) static RELEASE_SCRIPT: LazyLock<Script> = LazyLock::new(|| Script::new(RELEASE_LOCK));
pub(crate) static EXTEND_SCRIPT: LazyLock<Script> = LazyLock::new(|| Script::new(EXTEND_LOCK));
