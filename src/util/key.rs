use rand::Rng;
use time::OffsetDateTime;

/// Builds a key that will not collide with keys made by concurrent runs
/// sharing a bucket: `<prefix><unix-millis>-<8 hex digits>.<extension>`.
pub fn unique_key(prefix: &str, extension: &str) -> String {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    let suffix: u32 = rand::thread_rng().gen();

    let extension = extension.trim_start_matches('.');
    if extension.is_empty() {
        format!("{}{}-{:08x}", prefix, millis, suffix)
    } else {
        format!("{}{}-{:08x}.{}", prefix, millis, suffix, extension)
    }
}
