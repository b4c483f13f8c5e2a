use std::{fmt, time::Duration};

use notify_rust::Notification;
use tokio::sync::watch;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Severity {
    #[default]
    Normal,
    Active,
    Error,
}

/// The single user-visible status line.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Status {
    pub message: String,
    pub severity: Severity,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            Severity::Normal => "status",
            Severity::Active => "active",
            Severity::Error => "error",
        };
        write!(f, "[{tag}] {}", self.message)
    }
}

pub struct StatusIndicator {
    tx: watch::Sender<Status>,
    notifications: bool,
}

impl StatusIndicator {
    pub fn new(notifications: bool) -> Self {
        let (tx, _rx) = watch::channel(Status::default());
        Self { tx, notifications }
    }

    pub fn set(&self, message: impl Into<String>, severity: Severity) {
        let status = Status {
            message: message.into(),
            severity,
        };

        if severity == Severity::Error {
            log::warn!("{}", status.message);
            if self.notifications {
                notify(status.message.clone());
            }
        } else {
            log::debug!("{}", status.message);
        }

        self.tx.send_replace(status);
    }

    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.tx.subscribe()
    }
}

fn notify(body: String) {
    tokio::task::spawn_local(async move {
        let _res = Notification::new()
            .appname("drone-rescue-daemon")
            .summary("Drone Rescue")
            .body(&body)
            .icon("dialog-warning-symbolic")
            .urgency(notify_rust::Urgency::Normal)
            .timeout(Duration::from_secs(5))
            .show_async()
            .await;
    });
}
