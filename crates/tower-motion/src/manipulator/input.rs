use crate::hal::{Button, ControllerState};

/// Button levels and edges for one control tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OperatorEvents {
    previous: ControllerState,
    current: ControllerState,
}

impl OperatorEvents {
    pub fn new(previous: ControllerState, current: ControllerState) -> Self {
        Self { previous, current }
    }

    pub fn is_pressed(&self, button: Button) -> bool {
        self.current.is_pressed(button)
    }

    pub fn changed_to_pressed(&self, button: Button) -> bool {
        self.current.is_pressed(button) && !self.previous.is_pressed(button)
    }

    pub fn changed_to_released(&self, button: Button) -> bool {
        !self.current.is_pressed(button) && self.previous.is_pressed(button)
    }

    pub fn left_y(&self) -> f64 {
        self.current.left_y
    }

    pub fn right_y(&self) -> f64 {
        self.current.right_y
    }

    /// Mean of both vertical stick axes.
    pub fn stick_average(&self) -> f64 {
        (self.current.left_y + self.current.right_y) / 2.0
    }
}

/// Turns a stream of controller snapshots into [`OperatorEvents`].
#[derive(Debug, Clone, Default)]
pub struct EdgeTracker {
    last: ControllerState,
}

impl EdgeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self, current: ControllerState) -> OperatorEvents {
        let events = OperatorEvents::new(self.last, current);
        self.last = current;
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edges_fire_once() {
        let mut tracker = EdgeTracker::new();
        let held = ControllerState::default().with(Button::TrayToggle, true);

        let first = tracker.next(held);
        assert!(first.changed_to_pressed(Button::TrayToggle));
        assert!(first.is_pressed(Button::TrayToggle));

        let second = tracker.next(held);
        assert!(!second.changed_to_pressed(Button::TrayToggle));
        assert!(second.is_pressed(Button::TrayToggle));

        let released = tracker.next(ControllerState::default());
        assert!(released.changed_to_released(Button::TrayToggle));
        assert!(!released.is_pressed(Button::TrayToggle));
    }

    #[test]
    fn test_stick_average() {
        let events = OperatorEvents::new(
            ControllerState::default(),
            ControllerState::default().with_sticks(-0.5, -0.3),
        );
        assert!((events.stick_average() - (-0.4)).abs() < 1e-12);
        assert_eq!(events.left_y(), -0.5);
    }
}
