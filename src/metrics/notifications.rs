use chrono::{DateTime, Utc};

use crate::metrics::types::{Notification, NotificationType, Priority};

/// Build the dashboard notifications from the three pending/new counters.
/// `new_user_days` is the look-back window `new_user_count` was taken over.
///
/// Rules are emitted in priority order (collaborations, payments, new
/// users), each only when its count is positive. With nothing to report a
/// single read "all caught up" entry is returned, so the list is never empty.
pub fn generate(
    pending_collab_count: u64,
    pending_payment_count: u64,
    new_user_count: u64,
    new_user_days: i64,
    now: DateTime<Utc>,
) -> Vec<Notification> {
    let mut out = Vec::new();

    if pending_collab_count > 0 {
        let n = pending_collab_count;
        let message = if n == 1 {
            "1 collaboration request is pending approval".to_string()
        } else {
            format!("{n} collaboration requests are pending approval")
        };
        out.push(Notification {
            id: "pending-collaborations".into(),
            kind: NotificationType::Collaboration,
            title: "Pending Collaborations".into(),
            message,
            timestamp: now,
            read: false,
            priority: Priority::High,
        });
    }

    if pending_payment_count > 0 {
        let n = pending_payment_count;
        let message = if n == 1 {
            "1 payment requires verification".to_string()
        } else {
            format!("{n} payments require verification")
        };
        out.push(Notification {
            id: "pending-payments".into(),
            kind: NotificationType::Payment,
            title: "Payment Verification".into(),
            message,
            timestamp: now,
            read: false,
            priority: Priority::Medium,
        });
    }

    if new_user_count > 0 {
        let n = new_user_count;
        let when = window_phrase(new_user_days);
        let message = if n == 1 {
            format!("1 new user joined {when}")
        } else {
            format!("{n} new users joined {when}")
        };
        out.push(Notification {
            id: "new-users".into(),
            kind: NotificationType::User,
            title: "New Users".into(),
            message,
            timestamp: now,
            read: false,
            priority: Priority::Low,
        });
    }

    if out.is_empty() {
        out.push(caught_up(now));
    }
    out
}

fn window_phrase(days: i64) -> String {
    match days {
        i64::MIN..=0 => "today".to_string(),
        1 => "since yesterday".to_string(),
        7 => "this week".to_string(),
        n => format!("in the last {n} days"),
    }
}

/// The synthetic entry shown when nothing needs attention.
pub fn caught_up(now: DateTime<Utc>) -> Notification {
    Notification {
        id: "all-caught-up".into(),
        kind: NotificationType::Info,
        title: "All caught up".into(),
        message: "You're all caught up".into(),
        timestamp: now,
        read: true,
        priority: Priority::Low,
    }
}
