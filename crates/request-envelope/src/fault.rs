//! Failure routing for a single attempt
//!
//! Maps what went wrong with an attempt to what the client does next. Only a
//! first-attempt 401 is recoverable; everything else reaches the caller.

/// Set on an attempt once it has been resumed after a token refresh.
///
/// A marked attempt that is rejected again must never wait for another
/// refresh; that is what stops refresh loops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RetryMarker(bool);

impl RetryMarker {
    pub fn is_set(self) -> bool {
        self.0
    }

    pub fn set(&mut self) {
        self.0 = true;
    }
}

/// How an attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The backend answered with a non-2xx status.
    Status(u16),
    /// No response arrived (connect error, timeout, broken body).
    NoResponse,
}

/// What to do with a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultAction {
    /// Wait for the single-flight refresh, then replay once.
    Refresh,
    /// Surface to the caller and end the session.
    Fatal,
    /// Surface to the caller unchanged.
    Propagate,
    /// Surface as a transport failure the caller may retry.
    Unreachable,
}

/// | fault | marker | action |
/// |---|---|---|
/// | 401 | unset | `Refresh` |
/// | 401 | set | `Fatal` |
/// | any other status | any | `Propagate` |
/// | no response | any | `Unreachable` |
pub fn classify(fault: Fault, marker: RetryMarker) -> FaultAction {
    match fault {
        Fault::Status(401) if marker.is_set() => FaultAction::Fatal,
        Fault::Status(401) => FaultAction::Refresh,
        Fault::Status(_) => FaultAction::Propagate,
        Fault::NoResponse => FaultAction::Unreachable,
    }
}
