use serde_json::Value;

use crate::record::{Extra, Fields, NO_USER};

/// Ambient fields bound to a [`Logger`](crate::logger::Logger) and merged
/// into every record it emits.
///
/// A fresh context always carries `username = "-"`.
#[derive(Debug, Clone, PartialEq)]
pub struct Context {
    fields: Extra,
}

impl Default for Context {
    fn default() -> Self {
        let mut fields = Extra::new();
        fields.insert("username", NO_USER);
        Context { fields }
    }
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key, value);
        self
    }

    pub fn with_username(self, username: impl Into<String>) -> Self {
        self.with("username", username.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> &Extra {
        &self.fields
    }

    /// Overlay another context on this one; `other` wins on collision.
    pub fn merged_with(&self, other: &Context) -> Context {
        let mut fields = self.fields.clone();
        fields.extend_from(&other.fields);
        Context { fields }
    }
}

impl From<Extra> for Context {
    fn from(extra: Extra) -> Self {
        let mut ctx = Context::default();
        ctx.fields.extend_from(&extra);
        ctx
    }
}

/// Produce the final field set of a record.
///
/// Precedence, highest first: the call-site semantic argument, then a
/// call-site `extra` entry of the same name, then the ambient context.
/// Non-semantic keys are the union of ambient and call-site extras, the
/// call site winning on collision. Semantic keys never stay in `extra`.
pub fn merge(ambient: &Context, call: Fields) -> Fields {
    let Fields {
        action,
        method,
        username,
        module_name,
        extra: call_extra,
    } = call;

    let mut extra = ambient.fields.clone();
    extra.extend_from(&call_extra);

    let mut promote = |arg: Option<String>, key: &str| -> Option<String> {
        let fallback = extra.remove(key).and_then(|v| match v {
            Value::Null => None,
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        });
        arg.or(fallback)
    };

    let action = promote(action, "action");
    let method = promote(method, "method");
    let username = promote(username, "username");
    let module_name = promote(module_name, "module");

    Fields {
        action,
        method,
        username,
        module_name,
        extra,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_context_has_no_user_sentinel() {
        assert_eq!(Context::new().get("username"), Some(&json!("-")));
    }

    #[test]
    fn call_semantic_args_beat_everything() {
        let ambient = Context::new().with_username("ambient").with("action", "AMBIENT");
        let call = Fields::new()
            .username("call")
            .action("CALL")
            .extra("username", "extra")
            .extra("action", "EXTRA");

        let merged = merge(&ambient, call);
        assert_eq!(merged.username.as_deref(), Some("call"));
        assert_eq!(merged.action.as_deref(), Some("CALL"));
        assert!(!merged.extra.contains_key("username"));
        assert!(!merged.extra.contains_key("action"));
    }

    #[test]
    fn call_extra_beats_ambient() {
        let ambient = Context::new().with_username("ambient").with("tenant", "a");
        let call = Fields::new().extra("username", "extra").extra("tenant", "b");

        let merged = merge(&ambient, call);
        assert_eq!(merged.username.as_deref(), Some("extra"));
        assert_eq!(merged.extra.get("tenant"), Some(&json!("b")));
    }

    #[test]
    fn ambient_fills_gaps() {
        let ambient = Context::new()
            .with_username("bob")
            .with("module", "billing")
            .with("request_id", 42);

        let merged = merge(&ambient, Fields::new().method("POST"));
        assert_eq!(merged.username.as_deref(), Some("bob"));
        assert_eq!(merged.module_name.as_deref(), Some("billing"));
        assert_eq!(merged.method.as_deref(), Some("POST"));
        assert_eq!(merged.action, None);
        assert_eq!(merged.extra.get("request_id"), Some(&json!(42)));
    }

    #[test]
    fn non_string_semantic_values_are_stringified() {
        let merged = merge(&Context::new(), Fields::new().extra("username", 1001));
        assert_eq!(merged.username.as_deref(), Some("1001"));
    }

    #[test]
    fn merged_with_prefers_other() {
        let base = Context::new().with("a", 1).with("b", 1);
        let over = Context::from(Extra::from_iter([("b", 2)]));
        let merged = base.merged_with(&over);
        assert_eq!(merged.get("a"), Some(&json!(1)));
        assert_eq!(merged.get("b"), Some(&json!(2)));
        assert_eq!(merged.get("username"), Some(&json!("-")));
    }
}
