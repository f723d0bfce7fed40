//! Traversable document over a parsed HTML tree.
//!
//! All parser-specific code lives here; extraction only sees `Document`,
//! `Node` and compiled `Selector`s. Every lookup returns `Option` or an
//! iterator so a missing element can never abort a caller.

use scraper::{ElementRef, Html};
use thiserror::Error;

pub use scraper::Selector;

#[derive(Debug, Error)]
#[error("invalid selector `{css}`: {reason}")]
pub struct SelectorError {
    pub css: String,
    pub reason: String,
}

/// Compile a CSS selector.
pub fn css(selector: &str) -> Result<Selector, SelectorError> {
    Selector::parse(selector).map_err(|e| SelectorError {
        css: selector.to_string(),
        reason: e.to_string(),
    })
}

pub struct Document {
    html: Html,
}

impl Document {
    pub fn parse(markup: &str) -> Self {
        Self {
            html: Html::parse_document(markup),
        }
    }

    pub fn root(&self) -> Node<'_> {
        Node(self.html.root_element())
    }
}

#[derive(Clone, Copy)]
pub struct Node<'a>(ElementRef<'a>);

impl<'a> Node<'a> {
    /// First descendant matching `sel`.
    pub fn find(&self, sel: &Selector) -> Option<Node<'a>> {
        self.0.select(sel).next().map(Node)
    }

    pub fn find_all(&self, sel: &Selector) -> Vec<Node<'a>> {
        self.0.select(sel).map(Node).collect()
    }

    /// First descendant matching `sel` whose trimmed text equals `text`.
    pub fn find_with_text(&self, sel: &Selector, text: &str) -> Option<Node<'a>> {
        self.0
            .select(sel)
            .find(|el| el.text().collect::<String>().trim() == text)
            .map(Node)
    }

    /// Next sibling element matching `sel`, skipping text and non-matching elements.
    pub fn next_sibling(&self, sel: &Selector) -> Option<Node<'a>> {
        self.0
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .find(|el| sel.matches(el))
            .map(Node)
    }

    /// All descendant text, trimmed.
    pub fn text(&self) -> String {
        self.0.text().collect::<String>().trim().to_string()
    }

    /// Only the text nodes that are direct children, trimmed.
    pub fn own_text(&self) -> String {
        self.0
            .children()
            .filter_map(|child| child.value().as_text())
            .map(|t| &**t)
            .collect::<String>()
            .trim()
            .to_string()
    }

    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.0.value().attr(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HTML: &str = r#"
        <html><body>
          <h1 class="title">Smoking Hot <span itemprop="brand"><span itemprop="name">Kilian</span></span></h1>
          <h2>Other</h2><div class="x">no</div>
          <h2>Main accords</h2>
          text between
          <p>skip</p>
          <div class="accords">yes</div>
          <img itemprop="image" src="https://img/1.jpg">
        </body></html>
    "#;

    #[test]
    fn own_text_excludes_children() {
        let doc = Document::parse(HTML);
        let h1 = doc.root().find(&css("h1.title").unwrap()).unwrap();
        assert_eq!(h1.own_text(), "Smoking Hot");
        assert_eq!(h1.text(), "Smoking Hot Kilian");
    }

    #[test]
    fn heading_sibling_lookup() {
        let doc = Document::parse(HTML);
        let h2 = doc
            .root()
            .find_with_text(&css("h2").unwrap(), "Main accords")
            .unwrap();
        let div = h2.next_sibling(&css("div").unwrap()).unwrap();
        assert_eq!(div.text(), "yes");
    }

    #[test]
    fn missing_lookups_are_none() {
        let doc = Document::parse(HTML);
        let root = doc.root();
        assert!(root.find(&css("table").unwrap()).is_none());
        assert!(root.find_with_text(&css("h2").unwrap(), "Nope").is_none());
        let img = root.find(&css("img").unwrap()).unwrap();
        assert_eq!(img.attr("src"), Some("https://img/1.jpg"));
        assert_eq!(img.attr("alt"), None);
    }

    #[test]
    fn bad_selector_is_an_error() {
        assert!(css("div[").is_err());
    }
}
