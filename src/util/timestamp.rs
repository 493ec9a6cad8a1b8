//! Fixed-offset (UTC+05:00) timestamp rendering for sitemaps and logs.

use std::fmt;

use time::{OffsetDateTime, UtcOffset, macros::offset};
use tracing_subscriber::fmt::{format::Writer, time::FormatTime};

/// Offset applied to every rendered timestamp. The zone observes no daylight saving.
pub const SITE_OFFSET: UtcOffset = offset!(+5);

const SITE_OFFSET_SUFFIX: &str = "+05:00";

/// Render `instant` as `YYYY-MM-DDTHH:mm:ss.sss+05:00`.
///
/// The instant is normalised to UTC first, so inputs carrying any offset
/// produce the same output for the same absolute moment. Day, month and year
/// rollover follow the proleptic Gregorian calendar.
pub fn format(instant: OffsetDateTime) -> String {
    let local = instant.to_offset(SITE_OFFSET);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}{SITE_OFFSET_SUFFIX}",
        local.year(),
        u8::from(local.month()),
        local.day(),
        local.hour(),
        local.minute(),
        local.second(),
        local.millisecond(),
    )
}

/// Render the current instant.
pub fn now() -> String {
    format(OffsetDateTime::now_utc())
}

/// `tracing-subscriber` timer printing log timestamps at the site offset.
#[derive(Debug, Clone, Copy, Default)]
pub struct SiteOffsetTimer;

impl FormatTime for SiteOffsetTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        w.write_str(&now())
    }
}
