//! [`SignalBoard`] – input signal bookkeeping for world clients.
//!
//! A world client typically exposes a couple of dozen named buttons (movement
//! keys, jump, crouch, emote wheel…).  Instead of one field per button the
//! board keeps a map from signal name to [`SignalState`], so clients iterate
//! it generically when building the next input packet.
//!
//! # Example
//!
//! ```
//! use embody_hal::signals::SignalBoard;
//!
//! let mut board = SignalBoard::new();
//! board.set("forward", true);
//! assert!(board.state("forward").pressed);
//!
//! board.end_frame();
//! assert!(board.is_down("forward"));
//! assert!(!board.state("forward").pressed);
//! ```

use std::collections::BTreeMap;

/// Per-signal state, including the edges seen since the last frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalState {
    /// The signal is currently held.
    pub down: bool,
    /// The signal went down since the last [`SignalBoard::end_frame`].
    pub pressed: bool,
    /// The signal went up since the last [`SignalBoard::end_frame`].
    pub released: bool,
}

/// Map of signal name → [`SignalState`].
///
/// Unknown names read as the default (up, no edges).
#[derive(Debug, Clone, Default)]
pub struct SignalBoard {
    states: BTreeMap<String, SignalState>,
}

impl SignalBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update `name` to `down`, recording a press or release edge when the
    /// state actually changes.
    pub fn set(&mut self, name: &str, down: bool) {
        let state = self.states.entry(name.to_string()).or_default();
        if state.down == down {
            return;
        }
        state.down = down;
        if down {
            state.pressed = true;
        } else {
            state.released = true;
        }
    }

    /// Current state of `name`.
    pub fn state(&self, name: &str) -> SignalState {
        self.states.get(name).copied().unwrap_or_default()
    }

    pub fn is_down(&self, name: &str) -> bool {
        self.state(name).down
    }

    /// Release every held signal.
    pub fn release_all(&mut self) {
        for state in self.states.values_mut() {
            if state.down {
                state.down = false;
                state.released = true;
            }
        }
    }

    /// Clear press/release edges once the client has sent a frame.
    pub fn end_frame(&mut self) {
        for state in self.states.values_mut() {
            state.pressed = false;
            state.released = false;
        }
    }

    /// Names of all held signals, in name order.
    pub fn held(&self) -> Vec<&str> {
        self.states
            .iter()
            .filter(|(_, s)| s.down)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Iterate over every known signal.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SignalState)> {
        self.states.iter().map(|(name, s)| (name.as_str(), s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_signal_is_up() {
        let board = SignalBoard::new();
        assert_eq!(board.state("jump"), SignalState::default());
    }

    #[test]
    fn repeated_set_does_not_create_new_edges() {
        let mut board = SignalBoard::new();
        board.set("run", true);
        board.end_frame();
        board.set("run", true);
        let s = board.state("run");
        assert!(s.down);
        assert!(!s.pressed);
    }

    #[test]
    fn release_all_records_release_edges() {
        let mut board = SignalBoard::new();
        board.set("forward", true);
        board.set("left", true);
        board.end_frame();
        board.release_all();
        assert!(board.held().is_empty());
        assert!(board.state("forward").released);
        assert!(board.state("left").released);
    }

    #[test]
    fn held_lists_only_down_signals() {
        let mut board = SignalBoard::new();
        board.set("forward", true);
        board.set("run", true);
        board.set("run", false);
        assert_eq!(board.held(), vec!["forward"]);
        assert_eq!(board.iter().count(), 2);
    }
}
