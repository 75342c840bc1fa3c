//! Analytics summary encoding published to the `traffic_monitor` SCS
//! channel (spec §3, §6).
//!
//! ASCII, `|`-delimited, no escaping. Fields cannot contain `|` (§9 open
//! question). The format is kept exactly as specified rather than hardened,
//! since the downstream anomaly detector (out of scope) expects this wire
//! shape verbatim.

pub fn encode_summary(ip: &str, timestamp_ns: i64, payload_len: usize) -> String {
    format!("{ip}|{timestamp_ns}|{payload_len}")
}
