use serde_json::Value;
use tracing::{error, info, warn};

use crate::config::DispatcherConfig;
use crate::dom::{accepts_typing, compile_pattern, find_by_text, DocumentQuery, DomError, ElementActions};
use crate::polling::{self, PollError, Timer};
use crate::protocol::{Command, CommandKind, DecodeError, Response};
use crate::typing::{simulate_typing, simulate_typing_simple};

const NO_TYPING_TARGET: &str = "No active input, textarea, or div with role textbox element";
const NO_ACTIVE_ELEMENT: &str = "No active element";
const NO_NEXT_FOCUSABLE: &str = "No next focusable element";

/// Why a command failed, and what the failure response should say.
#[derive(Debug)]
enum Failure {
    /// Report the command's own description; `cause` is only logged.
    Described { cause: String },
    /// Report `reason` in place of the description.
    Reason(String),
}

impl Failure {
    fn described(cause: impl ToString) -> Self {
        Failure::Described { cause: cause.to_string() }
    }

    fn into_response(self, description: &str) -> (Response, String) {
        match self {
            Failure::Described { cause } => (Response::failed(description), cause),
            Failure::Reason(reason) => (Response::failed(reason.clone()), reason),
        }
    }
}

impl From<DomError> for Failure {
    fn from(err: DomError) -> Self {
        Failure::described(err)
    }
}

impl From<PollError> for Failure {
    fn from(err: PollError) -> Self {
        Failure::described(err)
    }
}

type Outcome = Result<Response, Failure>;

/// Runs commands against one document, producing exactly one [`Response`]
/// per message.
pub struct Dispatcher<D, T> {
    document: D,
    timer: T,
    config: DispatcherConfig,
}

impl<D: DocumentQuery, T: Timer> Dispatcher<D, T> {
    pub fn new(document: D, timer: T, config: DispatcherConfig) -> Self {
        Dispatcher { document, timer, config }
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    /// Decodes and runs a raw message. Unknown or missing `type` tags get an
    /// `UNKNOWN_COMMAND` reply; known tags with bad fields get `ACTION_FAILED`.
    pub async fn handle_message(&self, message: Value) -> Response {
        match Command::decode(message) {
            Ok(command) => self.dispatch(command).await,
            Err(DecodeError::UnknownType(command_type)) => {
                warn!(%command_type, "unknown command type");
                Response::UnknownCommand {
                    description: DecodeError::UnknownType(command_type.clone()).to_string(),
                    command_type: Some(command_type),
                }
            }
            Err(err @ DecodeError::MissingType) => {
                warn!("message without a command type");
                Response::UnknownCommand {
                    command_type: None,
                    description: err.to_string(),
                }
            }
            Err(err @ DecodeError::Malformed { .. }) => {
                error!(error = %err, "malformed command");
                Response::failed(err.to_string())
            }
        }
    }

    pub async fn dispatch(&self, command: Command) -> Response {
        let Command { description, kind } = command;
        let command_type = kind.type_name();
        info!(command_type, %description, "received command");

        let outcome = match kind {
            CommandKind::Click { selector } => self.click(&selector),
            CommandKind::Retrieve { selector, key, pattern } => {
                self.retrieve(&selector, key, pattern.as_deref())
            }
            CommandKind::Wait { selector, timeout, retries, text_content } => {
                // An empty pattern means a plain selector wait.
                let text_content = text_content.as_deref().filter(|text| !text.is_empty());
                self.wait(&selector, text_content, timeout, retries).await
            }
            CommandKind::WaitForUrl { url_pattern, timeout, retries } => {
                polling::wait_for_url(&self.document, &self.timer, &url_pattern, timeout, retries)
                    .await
                    .map(|_| Response::completed())
                    .map_err(Failure::from)
            }
            CommandKind::NestedClick { parent_selector, child_selector } => {
                self.nested_click(&parent_selector, &child_selector)
            }
            CommandKind::ClickByText { tag, text } => self.click_by_text(&tag, &text),
            CommandKind::FillValue { value } => self.type_into_active(&value).await,
            CommandKind::TypeText { text } => self.type_into_active(&text).await,
            CommandKind::FillChildPValue { value } => self.fill_child_paragraph(&value),
            CommandKind::MoveToNextElement => self.move_to_next_element(),
            CommandKind::FocusElement { selector } => self.focus_element(&selector),
            CommandKind::Log { message } => {
                info!(%message, "log action");
                Ok(Response::ActionCompleted { message: Some(message) })
            }
            CommandKind::ProcessingFinished => {
                info!("processing finished");
                Ok(Response::ProcessingCompleted)
            }
        };

        match outcome {
            Ok(response) => {
                info!(command_type, %description, response = response.type_name(), "action completed");
                response
            }
            Err(failure) => {
                let (response, cause) = failure.into_response(&description);
                error!(command_type, %description, %cause, "action failed");
                response
            }
        }
    }

    fn click(&self, selector: &str) -> Outcome {
        let element = self.require(selector)?;
        element.click()?;
        Ok(Response::completed())
    }

    fn nested_click(&self, parent_selector: &str, child_selector: &str) -> Outcome {
        let parent = self.require(parent_selector)?;
        let child = parent
            .query_selector(child_selector)?
            .ok_or_else(|| Failure::described(format!(
                "no '{}' inside '{}'",
                child_selector, parent_selector
            )))?;
        child.click()?;
        Ok(Response::completed())
    }

    fn click_by_text(&self, tag: &str, text: &str) -> Outcome {
        let pattern = compile_pattern(text)?;
        let element = find_by_text(&self.document, tag, &pattern).ok_or_else(|| {
            Failure::described(format!("no <{}> with text matching '{}'", tag, text))
        })?;
        element.click()?;
        Ok(Response::completed())
    }

    /// First element, in document order, that has a value (matching
    /// `pattern` when one is given).
    fn retrieve(&self, selector: &str, key: String, pattern: Option<&str>) -> Outcome {
        let pattern = pattern.map(compile_pattern).transpose()?;
        let value = self
            .document
            .query_selector_all(selector)?
            .iter()
            .filter_map(ElementActions::value)
            .find(|value| pattern.as_ref().map_or(true, |p| p.is_match(value)))
            .ok_or_else(|| Failure::described(format!("no value found for '{}'", selector)))?;
        info!(%key, %value, "retrieved value");
        Ok(Response::RetrieveCompleted { key, value })
    }

    async fn wait(
        &self,
        selector: &str,
        text_content: Option<&str>,
        timeout: u32,
        retries: u32,
    ) -> Outcome {
        let attempts = match text_content {
            Some(pattern) => {
                polling::wait_for_element_with_text(
                    &self.document,
                    &self.timer,
                    selector,
                    pattern,
                    timeout,
                    retries,
                )
                .await?
            }
            None => {
                polling::wait_for_element(&self.document, &self.timer, selector, timeout, retries)
                    .await?
            }
        };
        info!(selector, attempts, "wait satisfied");
        Ok(Response::completed())
    }

    async fn type_into_active(&self, text: &str) -> Outcome {
        let element = self
            .document
            .active_element()
            .filter(accepts_typing)
            .ok_or_else(|| Failure::Reason(NO_TYPING_TARGET.to_string()))?;
        simulate_typing(&element, text, &self.timer, self.config.typing_delay_ms)
            .await
            .map_err(|e| Failure::Reason(e.to_string()))?;
        Ok(Response::completed())
    }

    /// Fills the first `<p>` of the focused element, creating it if needed.
    fn fill_child_paragraph(&self, value: &str) -> Outcome {
        let active = self
            .document
            .active_element()
            .ok_or_else(|| Failure::Reason(NO_ACTIVE_ELEMENT.to_string()))?;
        self.fill_paragraph(&active, value)
            .map_err(|e| Failure::Reason(e.to_string()))?;
        Ok(Response::completed())
    }

    fn fill_paragraph(&self, active: &D::Element, value: &str) -> Result<(), DomError> {
        let paragraph = match active.query_selector("p")? {
            Some(paragraph) => paragraph,
            None => {
                let paragraph = self.document.create_element("p")?;
                active.append_child(&paragraph)?;
                paragraph
            }
        };
        paragraph.clear_content();
        simulate_typing_simple(&self.document, &paragraph, value)
    }

    fn move_to_next_element(&self) -> Outcome {
        let current = self
            .document
            .active_element()
            .ok_or_else(|| Failure::Reason(NO_ACTIVE_ELEMENT.to_string()))?;
        let next = current
            .next_element_sibling()
            .filter(|next| next.tab_index() != -1)
            .ok_or_else(|| Failure::Reason(NO_NEXT_FOCUSABLE.to_string()))?;
        next.focus().map_err(|e| Failure::Reason(e.to_string()))?;
        Ok(Response::completed())
    }

    fn focus_element(&self, selector: &str) -> Outcome {
        let element = self.require(selector)?;
        element.click()?;
        element.focus()?;
        if element.is_content_editable() && element.has_child_nodes() {
            self.document.collapse_caret_to_start(&element)?;
        }
        Ok(Response::completed())
    }

    fn require(&self, selector: &str) -> Result<D::Element, Failure> {
        self.document
            .query_selector(selector)?
            .ok_or_else(|| Failure::from(DomError::ElementNotFound { selector: selector.to_string() }))
    }
}
