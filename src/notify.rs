//! User-facing notification seam.
//!
//! Delivery errors and automatic trip termination are reported through this
//! trait; the host adapter forwards them to local push notifications.

/// Fire-and-forget notification sink.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str, title: &str);
}

/// Default sink that writes notifications to the log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str, title: &str) {
        log::info!("[notify] {}: {}", title, message);
    }
}
