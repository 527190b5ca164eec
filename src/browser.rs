//! `web_sys` implementation of the DOM capabilities, used by the content script.
//!
//! Selectors may carry a prefix: `xpath:` evaluates an XPath expression,
//! `css:` (or no prefix) uses `querySelector`.

use gloo_timers::future::TimeoutFuture;
use js_sys::Reflect;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{
    Document, Element, Event, EventInit, HtmlDocument, HtmlElement, HtmlInputElement,
    HtmlTextAreaElement, InputEvent, InputEventInit, KeyboardEvent, KeyboardEventInit, Node,
    NodeList, Window,
};

use crate::dom::{DocumentQuery, DomError, ElementActions};
use crate::polling::Timer;
use crate::typing::SyntheticEvent;

/// Timer backed by `setTimeout`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlooTimer;

impl Timer for GlooTimer {
    type Sleep = TimeoutFuture;

    fn sleep(&self, ms: u32) -> TimeoutFuture {
        TimeoutFuture::new(ms)
    }
}

enum Selector<'a> {
    XPath(&'a str),
    Css(&'a str),
}

fn parse_selector(selector: &str) -> Selector<'_> {
    if let Some(xpath) = selector.strip_prefix("xpath:") {
        Selector::XPath(xpath)
    } else {
        Selector::Css(selector.strip_prefix("css:").unwrap_or(selector))
    }
}

fn js_message(value: &JsValue, fallback: &str) -> String {
    value
        .as_string()
        .or_else(|| {
            value
                .dyn_ref::<js_sys::Error>()
                .map(|e| String::from(e.message()))
        })
        .unwrap_or_else(|| fallback.to_string())
}

fn invalid_selector(selector: &str, err: JsValue) -> DomError {
    DomError::InvalidSelector {
        selector: selector.to_string(),
        error: js_message(&err, "Unknown selector error"),
    }
}

fn node_list_elements(list: NodeList) -> Vec<Element> {
    (0..list.length())
        .filter_map(|i| list.item(i))
        .filter_map(|node| node.dyn_into::<Element>().ok())
        .collect()
}

/// Runs an XPath query relative to `context`, in document order.
fn xpath_elements(
    document: &Document,
    context: &Node,
    xpath: &str,
    original_selector: &str,
) -> Result<Vec<Element>, DomError> {
    let result = document
        .evaluate(xpath, context)
        .map_err(|e| invalid_selector(original_selector, e))?;

    let mut elements = Vec::new();
    while let Some(node) = result.iterate_next().map_err(DomError::from)? {
        if let Ok(element) = node.dyn_into::<Element>() {
            elements.push(element);
        }
    }
    Ok(elements)
}

/// Lookup scope: the whole document or one element's subtree.
enum Scope<'a> {
    Document(&'a Document),
    Element(&'a Element),
}

impl Scope<'_> {
    fn owner(&self) -> Result<Document, DomError> {
        match self {
            Scope::Document(document) => Ok((*document).clone()),
            Scope::Element(element) => element.owner_document().ok_or_else(|| DomError::JsError {
                message: "Element has no owner document".to_string(),
            }),
        }
    }

    fn node(&self) -> &Node {
        match self {
            Scope::Document(document) => document,
            Scope::Element(element) => element,
        }
    }

    fn first(&self, selector: &str) -> Result<Option<Element>, DomError> {
        match parse_selector(selector) {
            Selector::XPath(xpath) => {
                Ok(xpath_elements(&self.owner()?, self.node(), xpath, selector)?
                    .into_iter()
                    .next())
            }
            Selector::Css(css) => {
                let found = match self {
                    Scope::Document(document) => document.query_selector(css),
                    Scope::Element(element) => element.query_selector(css),
                };
                found.map_err(|e| invalid_selector(selector, e))
            }
        }
    }

    fn all(&self, selector: &str) -> Result<Vec<Element>, DomError> {
        match parse_selector(selector) {
            Selector::XPath(xpath) => xpath_elements(&self.owner()?, self.node(), xpath, selector),
            Selector::Css(css) => {
                let found = match self {
                    Scope::Document(document) => document.query_selector_all(css),
                    Scope::Element(element) => element.query_selector_all(css),
                };
                found
                    .map(node_list_elements)
                    .map_err(|e| invalid_selector(selector, e))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct BrowserDocument {
    window: Window,
    document: Document,
}

impl BrowserDocument {
    pub fn new() -> Result<Self, DomError> {
        let window = web_sys::window().ok_or_else(|| DomError::JsError {
            message: "Failed to get window object".to_string(),
        })?;
        let document = window.document().ok_or_else(|| DomError::JsError {
            message: "Failed to get document object".to_string(),
        })?;
        Ok(BrowserDocument { window, document })
    }
}

impl DocumentQuery for BrowserDocument {
    type Element = BrowserElement;

    fn query_selector(&self, selector: &str) -> Result<Option<BrowserElement>, DomError> {
        Ok(Scope::Document(&self.document).first(selector)?.map(BrowserElement))
    }

    fn query_selector_all(&self, selector: &str) -> Result<Vec<BrowserElement>, DomError> {
        Ok(Scope::Document(&self.document)
            .all(selector)?
            .into_iter()
            .map(BrowserElement)
            .collect())
    }

    fn elements_by_tag_name(&self, tag: &str) -> Vec<BrowserElement> {
        let collection = self.document.get_elements_by_tag_name(tag);
        (0..collection.length())
            .filter_map(|i| collection.item(i))
            .map(BrowserElement)
            .collect()
    }

    fn active_element(&self) -> Option<BrowserElement> {
        self.document.active_element().map(BrowserElement)
    }

    fn create_element(&self, tag: &str) -> Result<BrowserElement, DomError> {
        Ok(BrowserElement(self.document.create_element(tag)?))
    }

    fn current_url(&self) -> Result<String, DomError> {
        self.window.location().href().map_err(|e| DomError::JsError {
            message: format!("Failed to get URL: {}", js_message(&e, "Unknown JS error")),
        })
    }

    fn insert_text(&self, text: &str) -> Result<(), DomError> {
        let inserted = self
            .document
            .unchecked_ref::<HtmlDocument>()
            .exec_command_with_show_ui_and_value("insertText", false, text)?;
        if !inserted {
            tracing::debug!("insertText was not applied; no editable selection");
        }
        Ok(())
    }

    fn collapse_caret_to_start(&self, element: &BrowserElement) -> Result<(), DomError> {
        let Some(first_child) = element.0.first_child() else {
            return Ok(());
        };
        let range = self.document.create_range()?;
        range.set_start(&first_child, 0)?;
        range.collapse_with_to_start(true);
        let selection = self.window.get_selection()?.ok_or_else(|| DomError::JsError {
            message: "No selection available".to_string(),
        })?;
        selection.remove_all_ranges()?;
        selection.add_range(&range)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct BrowserElement(pub Element);

impl BrowserElement {
    fn html(&self) -> Result<&HtmlElement, DomError> {
        self.0
            .dyn_ref::<HtmlElement>()
            .ok_or_else(|| DomError::ElementTypeError {
                tag: self.0.tag_name(),
                expected_type: "HtmlElement".to_string(),
            })
    }
}

fn build_event(event: &SyntheticEvent) -> Result<Event, JsValue> {
    match event {
        SyntheticEvent::KeyDown(ch) | SyntheticEvent::KeyPress(ch) | SyntheticEvent::KeyUp(ch) => {
            let init = KeyboardEventInit::new();
            init.set_bubbles(true);
            init.set_cancelable(true);
            init.set_key(&ch.to_string());
            KeyboardEvent::new_with_keyboard_event_init_dict(event.event_type(), &init)
                .map(Event::from)
        }
        SyntheticEvent::Input { data } => {
            let init = InputEventInit::new();
            init.set_bubbles(true);
            init.set_cancelable(true);
            init.set_data(data.as_deref());
            InputEvent::new_with_event_init_dict(event.event_type(), &init).map(Event::from)
        }
        SyntheticEvent::Change => {
            let init = EventInit::new();
            init.set_bubbles(true);
            init.set_cancelable(true);
            Event::new_with_event_init_dict(event.event_type(), &init)
        }
    }
}

impl ElementActions for BrowserElement {
    fn tag_name(&self) -> String {
        self.0.tag_name()
    }

    fn attribute(&self, name: &str) -> Option<String> {
        self.0.get_attribute(name)
    }

    fn text_content(&self) -> String {
        self.0.text_content().unwrap_or_default()
    }

    fn value(&self) -> Option<String> {
        let value = Reflect::get(&self.0, &JsValue::from_str("value")).ok()?;
        if value.is_undefined() {
            return None;
        }
        value
            .as_string()
            .or_else(|| value.as_f64().map(|n| n.to_string()))
    }

    fn append_to_value(&self, ch: char) -> Result<(), DomError> {
        if let Some(input) = self.0.dyn_ref::<HtmlInputElement>() {
            input.set_value(&format!("{}{}", input.value(), ch));
        } else if let Some(textarea) = self.0.dyn_ref::<HtmlTextAreaElement>() {
            textarea.set_value(&format!("{}{}", textarea.value(), ch));
        } else {
            self.0.append_with_str_1(&ch.to_string())?;
        }
        Ok(())
    }

    fn click(&self) -> Result<(), DomError> {
        self.html()?.click();
        Ok(())
    }

    fn focus(&self) -> Result<(), DomError> {
        self.html()?.focus()?;
        Ok(())
    }

    fn tab_index(&self) -> i32 {
        self.0.dyn_ref::<HtmlElement>().map_or(-1, HtmlElement::tab_index)
    }

    fn is_content_editable(&self) -> bool {
        self.0
            .dyn_ref::<HtmlElement>()
            .map_or(false, HtmlElement::is_content_editable)
    }

    fn has_child_nodes(&self) -> bool {
        self.0.has_child_nodes()
    }

    fn next_element_sibling(&self) -> Option<Self> {
        self.0.next_element_sibling().map(BrowserElement)
    }

    fn query_selector(&self, selector: &str) -> Result<Option<Self>, DomError> {
        Ok(Scope::Element(&self.0).first(selector)?.map(BrowserElement))
    }

    fn append_child(&self, child: &Self) -> Result<(), DomError> {
        self.0.append_child(&child.0)?;
        Ok(())
    }

    fn clear_content(&self) {
        self.0.set_inner_html("");
    }

    fn dispatch(&self, event: &SyntheticEvent) -> Result<(), DomError> {
        let event = build_event(event)?;
        self.0.dispatch_event(&event)?;
        Ok(())
    }
}
