// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//==============================================================================
// Imports
//==============================================================================

use ::std::sync::Once;

//==============================================================================
// Static Variables
//==============================================================================

/// Guardian to the logging initialize function.
static INIT_LOG: Once = Once::new();

//==============================================================================
// Standalone Functions
//==============================================================================

/// Initializes logging features.
pub fn initialize() {
    INIT_LOG.call_once(|| {
        // Install the global logger configured from the RUST_LOG env var. The handle must stay
        // alive for the process lifetime or the logger shuts down with it.
        if let Ok(logger) = ::flexi_logger::Logger::try_with_env_or_str("info") {
            if let Ok(handle) = logger.start() {
                ::std::mem::forget(handle);
            }
        }
    });
}
