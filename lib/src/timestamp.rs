// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! RFC 3339 timestamps for the update manifest's `pub_date`.

use std::fmt;

use chrono::{
    DateTime, FixedOffset, Local, NaiveDateTime, SecondsFormat, TimeZone,
};

/// How many fractional second digits to emit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Precision {
    /// No fractional part.
    #[default]
    Seconds,
    /// Exactly three fractional digits.
    Millis,
}

impl From<Precision> for SecondsFormat {
    fn from(precision: Precision) -> Self {
        match precision {
            Precision::Seconds => SecondsFormat::Secs,
            Precision::Millis => SecondsFormat::Millis,
        }
    }
}

/// Formats `time` with its own UTC offset.
///
/// The offset is always written out numerically, so UTC renders as `+00:00`
/// rather than `Z`.
pub fn format_rfc3339<Tz>(time: &DateTime<Tz>, precision: Precision) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    time.to_rfc3339_opts(precision.into(), false)
}

/// Formats a naive local time, attaching the local system offset.
pub fn format_naive_local(
    naive: NaiveDateTime,
    precision: Precision,
) -> String {
    format_rfc3339(&attach_local_offset(naive), precision)
}

/// Interprets `naive` as a local time.
///
/// Ambiguous local times (the repeated hour when clocks go back) take the
/// earlier offset. Local times that do not exist take the current offset.
pub fn attach_local_offset(naive: NaiveDateTime) -> DateTime<FixedOffset> {
    let offset = Local
        .offset_from_local_datetime(&naive)
        .earliest()
        .unwrap_or_else(|| *Local::now().offset());
    DateTime::from_naive_utc_and_offset(naive - offset, offset)
}

/// The publication time stamped into update manifests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PubDate {
    /// The local time when the date is rendered.
    #[default]
    Now,
    Fixed(DateTime<FixedOffset>),
}

impl PubDate {
    pub fn render(&self, precision: Precision) -> String {
        match self {
            PubDate::Now => format_rfc3339(&Local::now(), precision),
            PubDate::Fixed(time) => format_rfc3339(time, precision),
        }
    }
}
