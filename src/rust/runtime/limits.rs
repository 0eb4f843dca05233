// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

/// Maximum number of execution units the subsystem can track.
/// Every arena (dispatch slots, idle assignment, worker table) is sized by this.
pub const MAX_UNITS: usize = 256;

/// Maximum number of scheduling domains.
pub const MAX_DOMAINS: usize = 64;
