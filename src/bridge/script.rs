//! Host-side script builders.
//!
//! Every string literal is embedded as a JSON string, which is also a valid
//! JavaScript string literal.

use std::time::Duration;

use crate::types::{CallId, Value};

/// Quote `text` as a JavaScript string literal.
pub fn js_string(text: &str) -> String {
    Value::String(text.to_string()).to_string()
}

/// Wrap `code` so the host reports its outcome through `binding` as
/// `("success", id, value)` or `("error", id, message)`.
pub fn wrap_correlated(code: &str, id: CallId, binding: &str) -> String {
    format!(
        "(function(){{try{{var r=eval({code});{binding}(\"success\",{id},r===undefined?null:r);}}\
         catch(e){{{binding}(\"error\",{id},String(e));}}}})();",
        code = js_string(code),
    )
}

/// Init code calling `binding` every `interval`.
pub fn periodic(binding: &str, interval: Duration) -> String {
    format!(
        "setInterval(function(){{{binding}();}},{});",
        interval.as_millis().max(1)
    )
}

/// Fragment replacing everything under the root element.
pub fn replace_root(root_id: &str, html: &str) -> String {
    format!(
        "document.getElementById({}).innerHTML={};true",
        js_string(root_id),
        js_string(html)
    )
}

/// Join queued fragments into one batch body.
pub fn join_fragments(fragments: &[String]) -> String {
    fragments.join(";")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_js_string_escapes() {
        assert_eq!(js_string("a\"b"), r#""a\"b""#);
        assert_eq!(js_string("line\nbreak"), r#""line\nbreak""#);
    }

    #[test]
    fn test_wrap_correlated() {
        let wrapped = wrap_correlated("1+1", CallId(4), "cb");
        assert!(wrapped.contains(r#"eval("1+1")"#));
        assert!(wrapped.contains(r#"cb("success",4,"#));
        assert!(wrapped.contains(r#"cb("error",4,String(e))"#));
    }

    #[test]
    fn test_periodic() {
        assert_eq!(
            periodic("beat", Duration::from_millis(100)),
            "setInterval(function(){beat();},100);"
        );
    }

    #[test]
    fn test_replace_root() {
        assert_eq!(
            replace_root("root", "<p>A</p>"),
            r#"document.getElementById("root").innerHTML="<p>A</p>";true"#
        );
    }

    #[test]
    fn test_join() {
        let fragments = vec!["f1()".to_string(), "f2()".to_string()];
        assert_eq!(join_fragments(&fragments), "f1();f2()");
    }
}
