//! [`RepeatGuard`] – suppresses lines the agent said recently.
//!
//! Idle-loop models love a catchphrase.  The guard keeps a rolling window of
//! the last *N* ambient lines (compared case- and whitespace-insensitively)
//! and flags any new line already in the window.
//!
//! # Example
//!
//! ```rust
//! use embody_runtime::repeat_guard::RepeatGuard;
//!
//! let mut guard = RepeatGuard::new(2);
//!
//! assert!(!guard.is_repeat("Nice weather today."));
//! assert!(guard.is_repeat("nice  weather today."));  // same line
//!
//! assert!(!guard.is_repeat("Anyone up for tag?"));
//! assert!(!guard.is_repeat("I like this plaza."));
//! assert!(!guard.is_repeat("Nice weather today."));  // slid out of the window
//! ```

use std::collections::VecDeque;

/// Rolling window of recently spoken lines.
#[derive(Debug, Clone)]
pub struct RepeatGuard {
    window: usize,
    history: VecDeque<String>,
}

impl RepeatGuard {
    /// Remember the last `window` distinct lines.  A window of 0 disables the
    /// guard.
    pub fn new(window: usize) -> Self {
        Self {
            window,
            history: VecDeque::with_capacity(window),
        }
    }

    /// `true` if `line` matches a line in the window.  Otherwise the line is
    /// recorded and `false` is returned.
    pub fn is_repeat(&mut self, line: &str) -> bool {
        if self.window == 0 {
            return false;
        }
        let key = normalize(line);
        if self.history.contains(&key) {
            return true;
        }
        self.history.push_back(key);
        while self.history.len() > self.window {
            self.history.pop_front();
        }
        false
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Clear all recorded history.
    pub fn reset(&mut self) {
        self.history.clear();
    }
}

fn normalize(line: &str) -> String {
    line.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}
