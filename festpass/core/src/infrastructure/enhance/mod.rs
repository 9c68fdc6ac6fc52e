// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod registry;
pub mod restoration;

pub use registry::{EnhancerRegistry, EnhancerSelection};
pub use restoration::RestorationAdapter;
