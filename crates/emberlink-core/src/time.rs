/// Milliseconds since the Unix epoch, as stamped on relayed chat
/// envelopes and room creation records.
pub fn unix_millis_now() -> u64 {
    let dur = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    dur.as_millis() as u64
}
