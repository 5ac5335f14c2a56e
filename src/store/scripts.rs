//! Lua scripts executed atomically by Redis.
//!
//! Scores are microseconds of the Redis server clock, so every client shares
//! one time source. Members are built from the raw `TIME` strings because Lua
//! number formatting drops digits at this magnitude.

/// KEYS[1] = window, ARGV[1] = period (µs), ARGV[2] = max requests, ARGV[3] = nonce.
/// Returns `{admitted (0|1), entries in window}`.
pub(super) const ADMIT_TO_WINDOW: &str = r#"
redis.replicate_commands()
local t = redis.call('TIME')
local now = tonumber(t[1]) * 1000000 + tonumber(t[2])
local period = tonumber(ARGV[1])
local max_requests = tonumber(ARGV[2])

redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', now - period - 1)
local count = redis.call('ZCARD', KEYS[1])
if count >= max_requests then
  return {0, count}
end

redis.call('ZADD', KEYS[1], now, t[1] .. '.' .. t[2] .. '-' .. ARGV[3])
redis.call('PEXPIRE', KEYS[1], math.ceil(period / 1000))
return {1, count + 1}
"#;

/// KEYS[1] = window, ARGV[1] = period (µs). Returns the entry count.
pub(super) const WINDOW_LEN: &str = r#"
local t = redis.call('TIME')
local now = tonumber(t[1]) * 1000000 + tonumber(t[2])
return redis.call('ZCOUNT', KEYS[1], now - tonumber(ARGV[1]), '+inf')
"#;

/// KEYS[1] = lock key, ARGV[1] = token. Returns 1 if deleted.
pub(super) const DELETE_IF_EQUALS: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
end
return 0
"#;
