//! Requester and operator notifications.
//!
//! Lifecycle events (new request, approval, denial, deletion) go out as
//! plain-text emails over SMTP. Sending is best-effort everywhere: callers
//! log failures and carry on.

mod mailer;

pub use mailer::{Notifier, NotifyError, SmtpConfig, SmtpNotifier};
