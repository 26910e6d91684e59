// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, NaiveDateTime};
use workbench_release_lib::attach_local_offset;

/// Format accepted for local times without an offset.
const NAIVE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Parser for `--pub-date`. Accepts an RFC 3339 timestamp, or a local time
/// without an offset (e.g. "2024-05-01T08:00:00"), in which case the local
/// system offset is attached.
pub(crate) fn parse_pub_date(s: &str) -> Result<DateTime<FixedOffset>> {
    if let Ok(time) = DateTime::parse_from_rfc3339(s) {
        return Ok(time);
    }
    let naive = NaiveDateTime::parse_from_str(s, NAIVE_FORMAT).with_context(
        || {
            format!(
                "`{s}` is neither an RFC 3339 timestamp nor a local time \
                 of the form YYYY-MM-DDTHH:MM:SS"
            )
        },
    )?;
    Ok(attach_local_offset(naive))
}
