//! Markup access capability consumed by the extraction core
//!
//! The core never parses markup itself. It only needs to select sub-elements
//! inside a scope and read text or attributes from them; the scraper-backed
//! implementation lives in `infrastructure::markup`.

pub trait MarkupElement: Sized {
    /// Sub-elements of this scope matching `selector`, in document order.
    /// An unparseable selector matches nothing.
    fn select(&self, selector: &str) -> Vec<Self>;

    /// Text content of the element and its descendants
    fn text(&self) -> String;

    /// Named attribute, if present
    fn attr(&self, name: &str) -> Option<String>;

    /// Serialized markup of the element itself, used for repair snippets
    fn markup(&self) -> String;
}
