//! scraper-backed markup capability
//!
//! `scraper::Html` is not `Send`, so documents are parsed and walked inside
//! synchronous scopes only. Anything that has to outlive an await (a snippet for
//! repair, an element to re-attempt) is carried as serialized markup and parsed
//! again with [`parse_fragment`].

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::domain::markup::MarkupElement;

#[derive(Debug, Clone, Copy)]
pub struct ScrapedElement<'a> {
    element: ElementRef<'a>,
}

impl<'a> ScrapedElement<'a> {
    pub fn new(element: ElementRef<'a>) -> Self {
        Self { element }
    }

    /// Root element of a parsed document or fragment
    pub fn root(html: &'a Html) -> Self {
        Self::new(html.root_element())
    }
}

impl MarkupElement for ScrapedElement<'_> {
    fn select(&self, selector: &str) -> Vec<Self> {
        match Selector::parse(selector) {
            Ok(parsed) => self.element.select(&parsed).map(ScrapedElement::new).collect(),
            Err(e) => {
                debug!("Ignoring unparseable selector {:?}: {:?}", selector, e);
                Vec::new()
            }
        }
    }

    fn text(&self) -> String {
        self.element.text().collect::<Vec<_>>().join(" ")
    }

    fn attr(&self, name: &str) -> Option<String> {
        self.element.value().attr(name).map(str::to_string)
    }

    fn markup(&self) -> String {
        self.element.html()
    }
}

pub fn parse_document(body: &str) -> Html {
    Html::parse_document(body)
}

pub fn parse_fragment(markup: &str) -> Html {
    Html::parse_fragment(markup)
}

/// Whether `selector` is syntactically valid CSS for the markup backend
pub fn is_valid_selector(selector: &str) -> bool {
    Selector::parse(selector).is_ok()
}
