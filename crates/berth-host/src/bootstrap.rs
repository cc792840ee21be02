//! The single-writer bootstrap gate.
//!
//! Exactly one embedding front-end installs the process-wide host.
//! Installation is serialized by a lock; a second attempt is rejected
//! with an explicit error instead of silently replacing the singleton.

use std::sync::{Arc, Mutex};

use berth_core::BootstrapError;

use crate::supervisor::{Host, HostSpec};

static INSTALLED: Mutex<Option<Arc<Host>>> = Mutex::new(None);

/// Install the process-wide host from the given spec and start it.
///
/// Validation happens before installation, so a malformed candidate
/// leaves the gate untouched. The start sequence (scan and load) runs
/// under the gate's lock, matching the single-writer contract: no other
/// bootstrap attempt can interleave with it.
pub fn bootstrap(spec: HostSpec) -> Result<Arc<Host>, BootstrapError> {
    let mut installed = INSTALLED.lock().expect("bootstrap gate lock poisoned");
    if installed.is_some() {
        return Err(BootstrapError::AlreadyInstalled);
    }

    let host = Host::create(spec)?;
    *installed = Some(host.clone());

    if let Err(error) = host.start() {
        // Cancellation during bootstrap means someone shut the host
        // down already; the installed reference stays, the caller
        // decides what to do with a dead host.
        tracing::error!(%error, "host start aborted");
    }

    Ok(host)
}

/// The installed host, if any.
pub fn installed() -> Option<Arc<Host>> {
    INSTALLED
        .lock()
        .expect("bootstrap gate lock poisoned")
        .clone()
}

#[cfg(test)]
fn reset() {
    INSTALLED
        .lock()
        .expect("bootstrap gate lock poisoned")
        .take();
}
