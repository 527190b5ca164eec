//! In-memory page used by the unit tests.
//!
//! Selectors are limited to compound `tag#id.class` forms; anything with other
//! punctuation is reported as an invalid selector. Elements keep a journal of
//! what was done to them (`click`, `focus`, `keydown:a`, `append:a`, ...).

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use futures::future::{ready, Ready};

use crate::dom::{DocumentQuery, DomError, ElementActions};
use crate::polling::Timer;
use crate::typing::SyntheticEvent;

struct Node {
    tag: String,
    attributes: RefCell<HashMap<String, String>>,
    text: RefCell<String>,
    value: RefCell<Option<String>>,
    tab_index: Cell<i32>,
    content_editable: Cell<bool>,
    clickable: Cell<bool>,
    children: RefCell<Vec<FakeElement>>,
    parent: RefCell<Weak<Node>>,
    journal: RefCell<Vec<String>>,
    appends: Cell<usize>,
}

#[derive(Clone)]
pub struct FakeElement(Rc<Node>);

impl std::fmt::Debug for FakeElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{}", self.0.tag.to_lowercase())?;
        for (name, value) in self.0.attributes.borrow().iter() {
            write!(f, " {}=\"{}\"", name, value)?;
        }
        write!(f, ">")
    }
}

impl FakeElement {
    pub fn new(tag: &str) -> Self {
        FakeElement(Rc::new(Node {
            tag: tag.to_uppercase(),
            attributes: RefCell::new(HashMap::new()),
            text: RefCell::new(String::new()),
            value: RefCell::new(None),
            tab_index: Cell::new(0),
            content_editable: Cell::new(false),
            clickable: Cell::new(true),
            children: RefCell::new(Vec::new()),
            parent: RefCell::new(Weak::new()),
            journal: RefCell::new(Vec::new()),
            appends: Cell::new(0),
        }))
    }

    pub fn attr(self, name: &str, value: &str) -> Self {
        self.0.attributes.borrow_mut().insert(name.to_string(), value.to_string());
        self
    }

    pub fn id(self, id: &str) -> Self {
        self.attr("id", id)
    }

    pub fn class(self, class: &str) -> Self {
        self.attr("class", class)
    }

    pub fn text(self, text: &str) -> Self {
        *self.0.text.borrow_mut() = text.to_string();
        self
    }

    pub fn with_value(self, value: &str) -> Self {
        *self.0.value.borrow_mut() = Some(value.to_string());
        self
    }

    pub fn with_tab_index(self, tab_index: i32) -> Self {
        self.0.tab_index.set(tab_index);
        self
    }

    pub fn content_editable(self) -> Self {
        self.0.content_editable.set(true);
        self
    }

    /// Makes `click` fail, like an element that is not an `HTMLElement`.
    pub fn unclickable(self) -> Self {
        self.0.clickable.set(false);
        self
    }

    pub fn push(&self, child: FakeElement) {
        *child.0.parent.borrow_mut() = Rc::downgrade(&self.0);
        self.0.children.borrow_mut().push(child);
    }

    pub fn events(&self) -> Vec<String> {
        self.0.journal.borrow().clone()
    }

    pub fn appends(&self) -> usize {
        self.0.appends.get()
    }

    pub fn children_count(&self) -> usize {
        self.0.children.borrow().len()
    }

    fn record(&self, entry: String) {
        self.0.journal.borrow_mut().push(entry);
    }

    fn descendants(&self, out: &mut Vec<FakeElement>) {
        for child in self.0.children.borrow().iter() {
            out.push(child.clone());
            child.descendants(out);
        }
    }

    fn matching(&self, selector: &str) -> Result<Vec<FakeElement>, DomError> {
        let selector = SimpleSelector::parse(selector)?;
        let mut all = Vec::new();
        self.descendants(&mut all);
        Ok(all.into_iter().filter(|e| selector.matches(e)).collect())
    }
}

impl ElementActions for FakeElement {
    fn tag_name(&self) -> String {
        self.0.tag.clone()
    }

    fn attribute(&self, name: &str) -> Option<String> {
        self.0.attributes.borrow().get(name).cloned()
    }

    fn text_content(&self) -> String {
        let mut text = self.0.text.borrow().clone();
        for child in self.0.children.borrow().iter() {
            text.push_str(&child.text_content());
        }
        text
    }

    fn value(&self) -> Option<String> {
        self.0.value.borrow().clone()
    }

    fn append_to_value(&self, ch: char) -> Result<(), DomError> {
        let mut value = self.0.value.borrow_mut();
        value.get_or_insert_with(String::new).push(ch);
        self.0.appends.set(self.0.appends.get() + 1);
        self.record(format!("append:{}", ch));
        Ok(())
    }

    fn click(&self) -> Result<(), DomError> {
        if !self.0.clickable.get() {
            return Err(DomError::ElementTypeError {
                tag: self.0.tag.clone(),
                expected_type: "HtmlElement".to_string(),
            });
        }
        self.record("click".to_string());
        Ok(())
    }

    fn focus(&self) -> Result<(), DomError> {
        self.record("focus".to_string());
        Ok(())
    }

    fn tab_index(&self) -> i32 {
        self.0.tab_index.get()
    }

    fn is_content_editable(&self) -> bool {
        self.0.content_editable.get()
    }

    fn has_child_nodes(&self) -> bool {
        !self.0.children.borrow().is_empty() || !self.0.text.borrow().is_empty()
    }

    fn next_element_sibling(&self) -> Option<Self> {
        let parent = self.0.parent.borrow().upgrade()?;
        let siblings = parent.children.borrow();
        let position = siblings.iter().position(|s| Rc::ptr_eq(&s.0, &self.0))?;
        siblings.get(position + 1).cloned()
    }

    fn query_selector(&self, selector: &str) -> Result<Option<Self>, DomError> {
        Ok(self.matching(selector)?.into_iter().next())
    }

    fn append_child(&self, child: &Self) -> Result<(), DomError> {
        self.push(child.clone());
        Ok(())
    }

    fn clear_content(&self) {
        self.0.text.borrow_mut().clear();
        self.0.children.borrow_mut().clear();
        self.record("clear".to_string());
    }

    fn dispatch(&self, event: &SyntheticEvent) -> Result<(), DomError> {
        let entry = match event {
            SyntheticEvent::KeyDown(ch) | SyntheticEvent::KeyPress(ch) | SyntheticEvent::KeyUp(ch) => {
                format!("{}:{}", event.event_type(), ch)
            }
            SyntheticEvent::Input { data: Some(data) } => format!("input:{}", data),
            SyntheticEvent::Input { data: None } | SyntheticEvent::Change => {
                event.event_type().to_string()
            }
        };
        self.record(entry);
        Ok(())
    }
}

/// `tag#id.class`, each part optional.
struct SimpleSelector {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
}

impl SimpleSelector {
    fn parse(selector: &str) -> Result<Self, DomError> {
        let valid = !selector.is_empty()
            && selector
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '#' | '.'));
        if !valid {
            return Err(DomError::InvalidSelector {
                selector: selector.to_string(),
                error: "unsupported selector syntax".to_string(),
            });
        }

        let mut tag = String::new();
        let mut parts: Vec<(char, String)> = Vec::new();
        for c in selector.chars() {
            match c {
                '#' | '.' => parts.push((c, String::new())),
                _ => match parts.last_mut() {
                    Some((_, part)) => part.push(c),
                    None => tag.push(c),
                },
            }
        }

        let mut parsed = SimpleSelector {
            tag: (!tag.is_empty()).then(|| tag.to_uppercase()),
            id: None,
            classes: Vec::new(),
        };
        for (kind, name) in parts {
            match kind {
                '#' => parsed.id = Some(name),
                _ => parsed.classes.push(name),
            }
        }
        Ok(parsed)
    }

    fn matches(&self, element: &FakeElement) -> bool {
        if let Some(tag) = &self.tag {
            if &element.0.tag != tag {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if element.attribute("id").as_ref() != Some(id) {
                return false;
            }
        }
        let classes = element.attribute("class").unwrap_or_default();
        self.classes
            .iter()
            .all(|wanted| classes.split_whitespace().any(|c| c == wanted))
    }
}

struct Page {
    body: FakeElement,
    active: RefCell<Option<FakeElement>>,
    url: RefCell<String>,
    inserted: RefCell<Vec<String>>,
    carets: Cell<usize>,
}

#[derive(Clone)]
pub struct FakeDocument(Rc<Page>);

impl FakeDocument {
    pub fn new(url: &str) -> Self {
        FakeDocument(Rc::new(Page {
            body: FakeElement::new("body"),
            active: RefCell::new(None),
            url: RefCell::new(url.to_string()),
            inserted: RefCell::new(Vec::new()),
            carets: Cell::new(0),
        }))
    }

    pub fn body(&self) -> FakeElement {
        self.0.body.clone()
    }

    pub fn set_active(&self, element: &FakeElement) {
        *self.0.active.borrow_mut() = Some(element.clone());
    }

    pub fn clear_active(&self) {
        *self.0.active.borrow_mut() = None;
    }

    pub fn set_url(&self, url: &str) {
        *self.0.url.borrow_mut() = url.to_string();
    }

    pub fn inserted_text(&self) -> Vec<String> {
        self.0.inserted.borrow().clone()
    }

    /// How many times the caret was placed inside an element.
    pub fn caret_targets(&self) -> usize {
        self.0.carets.get()
    }
}

impl DocumentQuery for FakeDocument {
    type Element = FakeElement;

    fn query_selector(&self, selector: &str) -> Result<Option<FakeElement>, DomError> {
        self.0.body.query_selector(selector)
    }

    fn query_selector_all(&self, selector: &str) -> Result<Vec<FakeElement>, DomError> {
        self.0.body.matching(selector)
    }

    fn elements_by_tag_name(&self, tag: &str) -> Vec<FakeElement> {
        let mut all = Vec::new();
        self.0.body.descendants(&mut all);
        let tag = tag.to_uppercase();
        all.into_iter().filter(|e| e.0.tag == tag).collect()
    }

    fn active_element(&self) -> Option<FakeElement> {
        self.0.active.borrow().clone()
    }

    fn create_element(&self, tag: &str) -> Result<FakeElement, DomError> {
        Ok(FakeElement::new(tag))
    }

    fn current_url(&self) -> Result<String, DomError> {
        Ok(self.0.url.borrow().clone())
    }

    fn insert_text(&self, text: &str) -> Result<(), DomError> {
        self.0.inserted.borrow_mut().push(text.to_string());
        Ok(())
    }

    fn collapse_caret_to_start(&self, _element: &FakeElement) -> Result<(), DomError> {
        self.0.carets.set(self.0.carets.get() + 1);
        Ok(())
    }
}

/// Timer that never waits. Records each requested delay and runs the tick
/// hook (1-based) before the poll that follows it.
pub struct InstantTimer {
    delays: RefCell<Vec<u32>>,
    on_tick: RefCell<Option<Box<dyn FnMut(usize)>>>,
}

impl InstantTimer {
    pub fn new() -> Self {
        InstantTimer {
            delays: RefCell::new(Vec::new()),
            on_tick: RefCell::new(None),
        }
    }

    pub fn on_tick(self, hook: impl FnMut(usize) + 'static) -> Self {
        *self.on_tick.borrow_mut() = Some(Box::new(hook));
        self
    }

    pub fn delays(&self) -> Vec<u32> {
        self.delays.borrow().clone()
    }
}

impl Timer for InstantTimer {
    type Sleep = Ready<()>;

    fn sleep(&self, ms: u32) -> Ready<()> {
        let tick = {
            let mut delays = self.delays.borrow_mut();
            delays.push(ms);
            delays.len()
        };
        if let Some(hook) = self.on_tick.borrow_mut().as_mut() {
            hook(tick);
        }
        ready(())
    }
}
