//! Outward notifications raised by a dump run.
//!
//! The embedding application decides how they are shown; [`LogNotifier`] routes them to
//! tracing, [`ProgressBarNotifier`] drives an indicatif bar for the CLI, and
//! [`ChannelNotifier`] forwards them to another thread.

use crate::stats::Progress;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// A dump was requested while another was running
    DuplicateRun { target: PathBuf },
    Progress(Progress),
    Completed { target: PathBuf, queries: usize },
    Failed { target: PathBuf },
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) {
        match notification {
            Notification::DuplicateRun { target } => {
                warn!(path = ?target, "Recipe dump already running, request ignored");
            }
            Notification::Progress(p) => {
                info!(
                    completed = p.completed,
                    total = p.total,
                    percent = %format!("{:.1}", p.percent),
                    "Dump progress"
                );
            }
            Notification::Completed { target, queries } => {
                info!(path = ?target, queries, "Recipe dump complete");
            }
            Notification::Failed { target } => {
                warn!(path = ?target, "Recipe dump failed");
            }
        }
    }
}

/// Forwards every notification over an mpsc channel. Send errors are ignored.
pub struct ChannelNotifier {
    tx: Mutex<Sender<Notification>>,
}

impl ChannelNotifier {
    pub fn new(tx: Sender<Notification>) -> Self {
        Self { tx: Mutex::new(tx) }
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: Notification) {
        if let Ok(tx) = self.tx.lock() {
            let _ = tx.send(notification);
        }
    }
}

pub struct ProgressBarNotifier {
    bar: ProgressBar,
}

impl Default for ProgressBarNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressBarNotifier {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} queries ({msg})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        Self { bar }
    }
}

impl Notifier for ProgressBarNotifier {
    fn notify(&self, notification: Notification) {
        match notification {
            Notification::Progress(p) if p.total >= 0 => {
                self.bar.set_length(p.total as u64);
                self.bar.set_position(p.completed.max(0) as u64);
                self.bar.set_message(format!("{:.1}%", p.percent));
            }
            Notification::Progress(_) => {}
            Notification::Completed { queries, .. } => {
                self.bar.set_position(queries as u64);
                self.bar.finish_with_message("done");
            }
            Notification::Failed { .. } => self.bar.abandon_with_message("failed"),
            Notification::DuplicateRun { target } => {
                self.bar
                    .println(format!("A dump is already running, ignoring {}", target.display()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn channel_notifier_forwards_in_order() {
        let (tx, rx) = mpsc::channel();
        let notifier = ChannelNotifier::new(tx);
        notifier.notify(Notification::Progress(Progress::new(1, 2)));
        notifier.notify(Notification::Completed {
            target: PathBuf::from("out.json"),
            queries: 2,
        });

        let got: Vec<Notification> = rx.try_iter().collect();
        assert_eq!(got.len(), 2);
        assert!(matches!(got[0], Notification::Progress(p) if p.percent == 50.0));
        assert!(matches!(got[1], Notification::Completed { queries: 2, .. }));
    }

    #[test]
    fn channel_notifier_ignores_dropped_receiver() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        ChannelNotifier::new(tx).notify(Notification::Failed {
            target: PathBuf::from("x"),
        });
    }

    #[test]
    fn progress_bar_tracks_counters() {
        let notifier = ProgressBarNotifier::new();
        notifier.notify(Notification::Progress(Progress::new(3, 10)));
        assert_eq!(notifier.bar.length(), Some(10));
        assert_eq!(notifier.bar.position(), 3);
        notifier.notify(Notification::Completed {
            target: PathBuf::from("out.json"),
            queries: 10,
        });
        assert!(notifier.bar.is_finished());
    }
}
