//! Background delivery pipeline.
//!
//! Two long-running loops share this module:
//! - `notifier` drains the notification queue and pushes each row to
//!   Telegram, with per-row retry accounting.
//! - `reminders` fires once-daily deadline scans that enqueue due-soon and
//!   overdue notifications for the notifier to deliver.

pub mod notifier;
pub mod reminders;

pub use notifier::run_notifier;
pub use reminders::run_reminders;
