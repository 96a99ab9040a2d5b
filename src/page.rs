use wasm_bindgen::JsValue;
use web_sys::{Document, Element};

/// The handful of page operations the renderer needs. Keeping the surface
/// this small lets tests drive the rendering logic without a browser.
pub trait Page {
    type Node;

    fn find_by_id(&self, id: &str) -> Option<Self::Node>;
    fn find_first_by_class(&self, node: &Self::Node, class: &str) -> Option<Self::Node>;
    fn set_text(&self, node: &Self::Node, text: &str);
}

/// Live implementation backed by the hosting document.
pub struct DomPage {
    document: Document,
}

impl DomPage {
    pub fn new() -> Result<Self, JsValue> {
        let document = web_sys::window()
            .and_then(|win| win.document())
            .ok_or_else(|| JsValue::from_str("Document unavailable"))?;
        Ok(Self { document })
    }

    pub fn with_document(document: Document) -> Self {
        Self { document }
    }
}

impl Page for DomPage {
    type Node = Element;

    fn find_by_id(&self, id: &str) -> Option<Element> {
        self.document.get_element_by_id(id)
    }

    fn find_first_by_class(&self, node: &Element, class: &str) -> Option<Element> {
        node.get_elements_by_class_name(class).item(0)
    }

    fn set_text(&self, node: &Element, text: &str) {
        node.set_text_content(Some(text));
    }
}
