//! Alerting port trait.

/// Best-effort alert channel. Implementations log their own failures and
/// never propagate them, so a broken channel cannot mask a pipeline error.
pub trait NotifierPort {
    fn notify(&self, message: &str);
}
