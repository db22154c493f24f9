// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod schema;
mod agent;
mod loader;

pub use schema::*;
pub use agent::*;
pub use loader::load;
