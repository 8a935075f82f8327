use tracing::{debug, error};

use crate::session::WindowRect;

const ERROR_TITLE: &str = "Error";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NotificationId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: NotificationId,
    pub title: String,
    pub detail: String,
    /// Top-left corner in screen coordinates.
    pub position: (i32, i32),
    pub size: (u32, u32),
}

/// Whatever actually presents notifications to the user.
///
/// Implementations must return immediately; a notification stays visible
/// until [`close`](Self::close) is called for its id.
pub trait NotificationSurface {
    fn show(&mut self, notification: &Notification);
    fn close(&mut self, id: NotificationId);
}

/// Surface that only writes to the operator log.
#[derive(Debug, Default)]
pub struct LogSurface;

impl NotificationSurface for LogSurface {
    fn show(&mut self, notification: &Notification) {
        error!("{}: {}", notification.title, notification.detail);
    }

    fn close(&mut self, id: NotificationId) {
        debug!("notification {} closed", id.0);
    }
}

/// Top-left position that puts a `width` x `height` box flush with the
/// bottom-right corner of `window`.
pub fn pin_to_corner(window: &WindowRect, width: u32, height: u32) -> (i32, i32) {
    let width = i32::try_from(width).unwrap_or(i32::MAX);
    let height = i32::try_from(height).unwrap_or(i32::MAX);
    (
        window.right().saturating_sub(width),
        window.bottom().saturating_sub(height),
    )
}

/// Error reporting that never piles up: showing a notification first closes
/// the one still on screen.
pub struct NotificationChannel {
    surface: Box<dyn NotificationSurface>,
    anchor: WindowRect,
    size: (u32, u32),
    live: Option<Notification>,
    next_id: u64,
}

impl NotificationChannel {
    pub fn new(surface: Box<dyn NotificationSurface>, anchor: WindowRect, size: (u32, u32)) -> Self {
        Self {
            surface,
            anchor,
            size,
            live: None,
            next_id: 0,
        }
    }

    /// Replace the visible notification (if any) with `detail`.
    pub fn notify(&mut self, detail: impl Into<String>) {
        self.dismiss();
        self.next_id += 1;
        let id = NotificationId(self.next_id);
        let notification = Notification {
            id,
            title: ERROR_TITLE.to_string(),
            detail: detail.into(),
            position: pin_to_corner(&self.anchor, self.size.0, self.size.1),
            size: self.size,
        };
        self.surface.show(&notification);
        self.live = Some(notification);
    }

    pub fn dismiss(&mut self) {
        if let Some(previous) = self.live.take() {
            self.surface.close(previous.id);
        }
    }

    pub fn live(&self) -> Option<&Notification> {
        self.live.as_ref()
    }

    /// Window geometry used for notifications shown from now on.
    pub fn set_anchor(&mut self, window: WindowRect) {
        self.anchor = window;
    }
}

impl std::fmt::Debug for NotificationChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationChannel")
            .field("anchor", &self.anchor)
            .field("size", &self.size)
            .field("live", &self.live)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::BTreeSet;
    use std::rc::Rc;

    use pretty_assertions::assert_eq;

    use super::*;

    #[derive(Default)]
    struct Screen {
        open: BTreeSet<NotificationId>,
        shown: Vec<Notification>,
    }

    struct Recording(Rc<RefCell<Screen>>);

    impl NotificationSurface for Recording {
        fn show(&mut self, notification: &Notification) {
            let mut screen = self.0.borrow_mut();
            screen.open.insert(notification.id);
            screen.shown.push(notification.clone());
        }

        fn close(&mut self, id: NotificationId) {
            self.0.borrow_mut().open.remove(&id);
        }
    }

    fn channel() -> (NotificationChannel, Rc<RefCell<Screen>>) {
        let screen = Rc::new(RefCell::new(Screen::default()));
        let channel = NotificationChannel::new(
            Box::new(Recording(Rc::clone(&screen))),
            WindowRect::DEFAULT,
            (200, 80),
        );
        (channel, screen)
    }

    #[test]
    fn second_error_replaces_first() {
        let (mut channel, screen) = channel();
        channel.notify("first failure");
        let first = channel.live().unwrap().id;
        channel.notify("second failure");
        let second = channel.live().unwrap().id;
        assert_ne!(first, second);

        let screen = screen.borrow();
        assert_eq!(screen.open.iter().copied().collect::<Vec<_>>(), vec![second]);
        assert_eq!(screen.shown.len(), 2);
        assert_eq!(channel.live().unwrap().detail, "second failure");
    }

    #[test]
    fn pinned_to_bottom_right_of_window() {
        let (mut channel, screen) = channel();
        channel.notify("boom");
        assert_eq!(screen.borrow().shown[0].position, (500, 420));

        channel.set_anchor(WindowRect::new(0, 0, 1000, 800));
        channel.notify("boom again");
        assert_eq!(screen.borrow().shown[1].position, (800, 720));
        assert_eq!(screen.borrow().shown[1].title, "Error");
    }

    #[test]
    fn dismiss_closes_live_notification() {
        let (mut channel, screen) = channel();
        channel.dismiss();
        channel.notify("boom");
        channel.dismiss();
        assert!(channel.live().is_none());
        assert!(screen.borrow().open.is_empty());
    }

    #[test]
    fn corner_saturates_for_huge_boxes() {
        let window = WindowRect::new(i32::MIN + 10, 0, 20, 20);
        assert_eq!(pin_to_corner(&window, u32::MAX, 5), (i32::MIN, 15));
    }
}
