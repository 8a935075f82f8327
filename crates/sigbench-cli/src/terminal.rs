use std::fmt::Write as _;

use sigbench_host::{Notification, NotificationId, NotificationSurface};
use sigbench_module_sdk::Figure;
use tracing::debug;

/// Prints notifications to stderr. There is nothing to take off screen on
/// close, so closing only logs.
#[derive(Debug, Default)]
pub struct TerminalSurface;

impl NotificationSurface for TerminalSurface {
    fn show(&mut self, notification: &Notification) {
        eprintln!("!! {}: {}", notification.title, notification.detail);
    }

    fn close(&mut self, id: NotificationId) {
        debug!("notification {} closed", id.0);
    }
}

/// Text rendering of a figure: one line per panel and series.
pub fn describe_figure(figure: &Figure) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "figure r{}: {}",
        figure.revision(),
        figure.title().unwrap_or("(untitled)")
    );
    if figure.is_empty() {
        out.push_str("  (no panels)\n");
    }
    for panel in figure.panels() {
        let axes = match (&panel.x_label, &panel.y_label) {
            (Some(x), Some(y)) => format!(" [{x} / {y}]"),
            _ => String::new(),
        };
        let _ = writeln!(out, "  {}{axes}", panel.label);
        for series in &panel.series {
            let range = series
                .y_range()
                .map(|(min, max)| format!("y {min:.3}..{max:.3}"))
                .unwrap_or_else(|| "empty".to_string());
            let _ = writeln!(
                out,
                "    {}: {} points, {range}",
                series.label,
                series.points.len()
            );
        }
    }
    out
}
