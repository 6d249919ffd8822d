//! Element handles - typed change fragments for one DOM element.
//!
//! Every setter queues its fragment on the reconciler and returns the
//! promise of the batch that will carry it.

use crate::bridge::script::js_string;
use crate::promise::Promise;

use super::batcher::Reconciler;

/// Changes addressed to the element with a given html id.
#[derive(Clone)]
pub struct ElementHandle {
    html_id: String,
    reconciler: Reconciler,
}

impl ElementHandle {
    pub fn new(reconciler: &Reconciler, html_id: impl Into<String>) -> Self {
        Self {
            html_id: html_id.into(),
            reconciler: reconciler.clone(),
        }
    }

    pub fn html_id(&self) -> &str {
        &self.html_id
    }

    pub fn set_inner_html(&self, html: &str) -> Promise {
        self.change(&format!(".innerHTML={}", js_string(html)))
    }

    pub fn set_inner_text(&self, text: &str) -> Promise {
        self.change(&format!(".innerText={}", js_string(text)))
    }

    pub fn set_value(&self, value: &str) -> Promise {
        self.change(&format!(".value={}", js_string(value)))
    }

    pub fn set_attribute(&self, name: &str, value: &str) -> Promise {
        self.change(&format!(
            ".setAttribute({},{})",
            js_string(name),
            js_string(value)
        ))
    }

    pub fn remove_attribute(&self, name: &str) -> Promise {
        self.change(&format!(".removeAttribute({})", js_string(name)))
    }

    pub fn set_style(&self, property: &str, value: &str) -> Promise {
        self.change(&format!(
            ".style.setProperty({},{})",
            js_string(property),
            js_string(value)
        ))
    }

    pub fn remove(&self) -> Promise {
        self.change(".remove()")
    }

    /// Fragment applying `suffix` to the element.
    pub fn fragment(&self, suffix: &str) -> String {
        format!(
            "document.getElementById({}){}",
            js_string(&self.html_id),
            suffix
        )
    }

    fn change(&self, suffix: &str) -> Promise {
        self.reconciler.request_change(self.fragment(suffix))
    }
}
