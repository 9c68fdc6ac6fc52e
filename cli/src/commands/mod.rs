// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the FestPass CLI

pub mod reprocess;
pub mod serve;
pub mod status;
