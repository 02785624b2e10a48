//! Mode-button debouncing and press classification.
//!
//! The control loop hands every button reading to [`ButtonDebouncer::poll`].
//! A press counts once, when the pin has read pressed for `debounce_ms`
//! without interruption. Holding the button does not repeat it; the pin
//! must read released before the next press. Shorter blips are contact
//! bounce and are dropped.
//!
//! What a press does depends on the configured [`ButtonPolicy`]:
//!
//! | Policy    | First press | Press within window | Press outside window |
//! |-----------|-------------|---------------------|----------------------|
//! | `confirm` | `Armed`     | `Advance`           | `Armed`              |
//! | `direct`  | `Advance`   | `Advance`           | `Advance`            |

use serde::Deserialize;

use crate::hw::Level;

/// How button activity turns into mode changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ButtonPolicy {
    /// Two activations within the confirmation window: the first arms,
    /// the second advances the mode.
    #[default]
    Confirm,
    /// Every active poll advances the mode. Only the settle delay after a
    /// mode change throttles a held button.
    Direct,
}

/// Result of one debounced press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonAction {
    /// The confirmation window was opened. Nothing else happens yet; this
    /// is where lighting the active indicator for the window would go.
    Armed,
    /// Advance to the next mode.
    Advance,
}

/// Contact state between polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Contact {
    Released,
    /// Reading pressed since `since_ms`, not yet stable.
    Bouncing { since_ms: u32 },
    /// Press already reported; waiting for release.
    Held,
}

#[derive(Debug, Clone)]
pub struct ButtonDebouncer {
    policy: ButtonPolicy,
    window_ms: u32,
    debounce_ms: u32,
    contact: Contact,
    last_press_ms: Option<u32>,
}

impl ButtonDebouncer {
    pub fn new(policy: ButtonPolicy, window_ms: u32, debounce_ms: u32) -> Self {
        Self {
            policy,
            window_ms,
            debounce_ms,
            contact: Contact::Released,
            last_press_ms: None,
        }
    }

    /// Feed one reading of the button pin taken at `now_ms`. Returns an
    /// action only on the poll where a press becomes stable.
    pub fn poll(&mut self, level: Level, now_ms: u32) -> Option<ButtonAction> {
        self.expire_window(now_ms);

        match (self.contact, level) {
            (_, Level::Low) => {
                self.contact = Contact::Released;
                None
            }
            (Contact::Held, Level::High) => None,
            (Contact::Released, Level::High) => {
                self.contact = Contact::Bouncing { since_ms: now_ms };
                self.settle(now_ms, now_ms)
            }
            (Contact::Bouncing { since_ms }, Level::High) => self.settle(since_ms, now_ms),
        }
    }

    fn settle(&mut self, since_ms: u32, now_ms: u32) -> Option<ButtonAction> {
        if now_ms.wrapping_sub(since_ms) < self.debounce_ms {
            return None;
        }
        self.contact = Contact::Held;
        Some(self.on_button_active(now_ms))
    }

    /// Classify a debounced press at `now_ms`.
    ///
    /// Under `confirm`, only the arming press records a timestamp, so
    /// further presses inside the same window keep advancing.
    fn on_button_active(&mut self, now_ms: u32) -> ButtonAction {
        match self.policy {
            ButtonPolicy::Direct => ButtonAction::Advance,
            ButtonPolicy::Confirm => {
                if self.last_press_ms.is_some() {
                    ButtonAction::Advance
                } else {
                    self.last_press_ms = Some(now_ms);
                    ButtonAction::Armed
                }
            }
        }
    }

    /// Drop an arm whose window has passed. Runs on every poll, so the
    /// elapsed time never gets near a clock wrap.
    fn expire_window(&mut self, now_ms: u32) {
        if let Some(last) = self.last_press_ms {
            if now_ms.wrapping_sub(last) > self.window_ms {
                self.last_press_ms = None;
            }
        }
    }

    pub fn policy(&self) -> ButtonPolicy {
        self.policy
    }

    #[cfg(test)]
    pub fn last_press_ms(&self) -> Option<u32> {
        self.last_press_ms
    }
}
