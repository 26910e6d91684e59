// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod classify;
mod config;
mod manifest;
mod mirror;
mod preconditions;
mod publish;
mod release;
mod timestamp;
mod tool;

#[cfg(test)]
mod test_helpers;

pub use classify::*;
pub use config::*;
pub use manifest::*;
pub use mirror::*;
pub use preconditions::*;
pub use publish::*;
pub use release::*;
pub use timestamp::*;
pub use tool::*;
