//! Keyboard simulation for the fill and type commands.
//!
//! Page scripts often listen for key and input events rather than reading the
//! final value, so text is fed in one character at a time with the same event
//! sequence a real keystroke produces. Every event bubbles and is cancelable.

use tracing::debug;

use crate::dom::{DocumentQuery, DomError, ElementActions};
use crate::polling::Timer;

/// Events dispatched on the target element while typing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntheticEvent {
    /// `KeyboardEvent("keydown", { key })`
    KeyDown(char),
    /// `KeyboardEvent("keypress", { key })`
    KeyPress(char),
    /// `InputEvent("input", { data })`
    Input { data: Option<String> },
    /// `KeyboardEvent("keyup", { key })`
    KeyUp(char),
    /// `Event("change")`
    Change,
}

impl SyntheticEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            SyntheticEvent::KeyDown(_) => "keydown",
            SyntheticEvent::KeyPress(_) => "keypress",
            SyntheticEvent::Input { .. } => "input",
            SyntheticEvent::KeyUp(_) => "keyup",
            SyntheticEvent::Change => "change",
        }
    }
}

/// One step of a simulated keystroke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeystrokeStep {
    Click,
    Dispatch(SyntheticEvent),
    Append(char),
}

/// The exact sequence applied to the element for one character.
pub fn keystroke(ch: char) -> [KeystrokeStep; 7] {
    [
        KeystrokeStep::Click,
        KeystrokeStep::Dispatch(SyntheticEvent::KeyDown(ch)),
        KeystrokeStep::Dispatch(SyntheticEvent::KeyPress(ch)),
        KeystrokeStep::Append(ch),
        KeystrokeStep::Dispatch(SyntheticEvent::Input { data: Some(ch.to_string()) }),
        KeystrokeStep::Dispatch(SyntheticEvent::KeyUp(ch)),
        KeystrokeStep::Click,
    ]
}

/// Types `text` into `element` character by character, sleeping `delay_ms`
/// after each one.
pub async fn simulate_typing<E, T>(
    element: &E,
    text: &str,
    timer: &T,
    delay_ms: u32,
) -> Result<(), DomError>
where
    E: ElementActions,
    T: Timer,
{
    debug!(chars = text.chars().count(), delay_ms, "simulating typing");
    for ch in text.chars() {
        for step in keystroke(ch) {
            match step {
                KeystrokeStep::Click => element.click()?,
                KeystrokeStep::Dispatch(event) => element.dispatch(&event)?,
                KeystrokeStep::Append(ch) => element.append_to_value(ch)?,
            }
        }
        timer.sleep(delay_ms).await;
    }
    Ok(())
}

/// Rich-text variant: inserts the whole string at the caret in one go, then
/// fires a single `input` and `change` pair on `element`.
pub fn simulate_typing_simple<D: DocumentQuery>(
    document: &D,
    element: &D::Element,
    text: &str,
) -> Result<(), DomError> {
    document.insert_text(text)?;
    element.dispatch(&SyntheticEvent::Input { data: None })?;
    element.dispatch(&SyntheticEvent::Change)?;
    Ok(())
}
