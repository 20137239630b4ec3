// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod loader;
mod paths;
mod schema;
mod settings;

pub use loader::load;
pub use paths::StateHome;
pub use schema::*;
pub use settings::Settings;
