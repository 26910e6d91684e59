// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use itertools::Itertools;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PreconditionError {
    #[error(
        "required environment variables are not set: {}",
        .names.iter().join(", ")
    )]
    MissingSecrets { names: Vec<String> },
}

/// Checks that every variable in `names` is set to a non-empty value.
///
/// All missing variables are reported together. `lookup` is normally
/// `|name| std::env::var(name).ok()`.
pub fn check_secrets<S, F>(
    names: &[S],
    lookup: F,
) -> Result<(), PreconditionError>
where
    S: AsRef<str>,
    F: Fn(&str) -> Option<String>,
{
    let missing: Vec<String> = names
        .iter()
        .map(AsRef::as_ref)
        .filter(|name| {
            !matches!(lookup(name), Some(value) if !value.is_empty())
        })
        .map(str::to_owned)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(PreconditionError::MissingSecrets { names: missing })
    }
}

/// Checks `names` against the process environment.
pub fn check_env_secrets<S: AsRef<str>>(
    names: &[S],
) -> Result<(), PreconditionError> {
    check_secrets(names, |name| std::env::var(name).ok())
}
