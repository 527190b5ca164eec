//! DOM capabilities the dispatcher works against.
//!
//! The content script never touches `web_sys` directly outside of
//! [`crate::browser`]; everything else goes through [`DocumentQuery`] and
//! [`ElementActions`] so commands can be exercised against an in-memory page.

use regex::Regex;
use thiserror::Error;
use wasm_bindgen::JsValue;

use crate::typing::SyntheticEvent;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DomError {
    #[error("ElementNotFound: No element found for selector '{selector}'")]
    ElementNotFound { selector: String },
    #[error("InvalidSelector: Invalid selector '{selector}'. Details: {error}")]
    InvalidSelector { selector: String, error: String },
    #[error("ElementTypeError: Element '{tag}' is not of expected type '{expected_type}'")]
    ElementTypeError { tag: String, expected_type: String },
    #[error("InvalidPattern: Invalid pattern '{pattern}'. Details: {error}")]
    InvalidPattern { pattern: String, error: String },
    #[error("JsError: {message}")]
    JsError { message: String },
}

impl From<JsValue> for DomError {
    fn from(value: JsValue) -> Self {
        DomError::JsError {
            message: value
                .as_string()
                .unwrap_or_else(|| format!("{:?}", value)),
        }
    }
}

impl From<DomError> for JsValue {
    fn from(err: DomError) -> Self {
        JsValue::from_str(&err.to_string())
    }
}

/// Compiles a page-supplied pattern, reporting bad syntax as a [`DomError`].
///
/// Patterns use `regex` syntax, so JS `RegExp` features it lacks
/// (lookaround, backreferences) fail as [`DomError::InvalidPattern`].
pub fn compile_pattern(pattern: &str) -> Result<Regex, DomError> {
    Regex::new(pattern).map_err(|e| DomError::InvalidPattern {
        pattern: pattern.to_string(),
        error: e.to_string(),
    })
}

/// Operations on a single element.
///
/// Handles are cheap clones that refer to the same underlying node.
pub trait ElementActions: Clone {
    /// Upper-case tag name, as `Element.tagName` reports it for HTML.
    fn tag_name(&self) -> String;

    fn attribute(&self, name: &str) -> Option<String>;

    /// Concatenated text of the element and its descendants.
    fn text_content(&self) -> String;

    /// The element's `value` property, or `None` when the element has none.
    fn value(&self) -> Option<String>;

    /// Appends one character to the element's value (or content, for
    /// editable containers without a value).
    fn append_to_value(&self, ch: char) -> Result<(), DomError>;

    fn click(&self) -> Result<(), DomError>;

    fn focus(&self) -> Result<(), DomError>;

    /// `-1` marks an element that is excluded from sequential focus.
    fn tab_index(&self) -> i32;

    fn is_content_editable(&self) -> bool;

    fn has_child_nodes(&self) -> bool;

    fn next_element_sibling(&self) -> Option<Self>;

    /// First descendant matching `selector`.
    fn query_selector(&self, selector: &str) -> Result<Option<Self>, DomError>;

    fn append_child(&self, child: &Self) -> Result<(), DomError>;

    /// Removes all children (`innerHTML = ''`).
    fn clear_content(&self);

    fn dispatch(&self, event: &SyntheticEvent) -> Result<(), DomError>;
}

/// Document-level lookups and the few operations that act through the
/// document rather than on one element.
pub trait DocumentQuery {
    type Element: ElementActions;

    fn query_selector(&self, selector: &str) -> Result<Option<Self::Element>, DomError>;

    /// All matches, in document order.
    fn query_selector_all(&self, selector: &str) -> Result<Vec<Self::Element>, DomError>;

    /// All elements with the given tag, in document order.
    fn elements_by_tag_name(&self, tag: &str) -> Vec<Self::Element>;

    fn active_element(&self) -> Option<Self::Element>;

    fn create_element(&self, tag: &str) -> Result<Self::Element, DomError>;

    fn current_url(&self) -> Result<String, DomError>;

    /// Inserts text at the current selection (`execCommand("insertText")`).
    fn insert_text(&self, text: &str) -> Result<(), DomError>;

    /// Collapses the selection to the start of `element`'s first child.
    fn collapse_caret_to_start(&self, element: &Self::Element) -> Result<(), DomError>;
}

/// Whether `element` is something the typing commands may write into:
/// an `<input>`, a `<textarea>`, or a `<div role="textbox">`.
pub fn accepts_typing<E: ElementActions>(element: &E) -> bool {
    match element.tag_name().as_str() {
        "INPUT" | "TEXTAREA" => true,
        "DIV" => element.attribute("role").as_deref() == Some("textbox"),
        _ => false,
    }
}

/// First element whose trimmed text matches `pattern`, in document order.
pub fn find_by_text<D: DocumentQuery>(
    document: &D,
    tag: &str,
    pattern: &Regex,
) -> Option<D::Element> {
    document
        .elements_by_tag_name(tag)
        .into_iter()
        .find(|element| pattern.is_match(element.text_content().trim()))
}
