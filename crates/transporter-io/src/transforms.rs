//! Built-in [`TransformFn`] implementations and their registry factories:
//! name-keyed construction from a node's `options` mapping rather than a
//! closed match over transform variants.

use std::sync::Arc;

use serde_yaml::Mapping;
use transporter_core::{Message, Op, TransformFn, TransformOutcome, TransporterError};

use crate::registry::{require_str, TransformRegistry};

/// Forwards every message unchanged. Useful for testing pipeline
/// connectivity and as a default when a node needs no real transformation.
pub fn passthrough(_message: Message) -> TransformOutcome {
    TransformOutcome::Emit(_message)
}

/// Builds a transform that drops every message whose `op` matches the
/// configured one, passing everything else through.
pub struct DropOp {
    op: Op,
}

impl DropOp {
    pub fn new(op: Op) -> Self {
        Self { op }
    }
}

impl TransformFn for DropOp {
    fn call(&self, message: Message) -> TransformOutcome {
        if message.op == self.op {
            TransformOutcome::Drop
        } else {
            TransformOutcome::Emit(message)
        }
    }
}

/// Renames one document field, leaving every other field untouched.
pub struct RenameField {
    from: String,
    to: String,
}

impl RenameField {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self { from: from.into(), to: to.into() }
    }
}

impl TransformFn for RenameField {
    fn call(&self, mut message: Message) -> TransformOutcome {
        if let Some(value) = message.data.remove(&self.from) {
            message.data.insert(self.to.clone(), value);
        }
        TransformOutcome::Emit(message)
    }
}

/// Uppercases a message's namespace. Mostly useful for demos and tests that
/// want to see a transform visibly rewrite a message.
pub struct UppercaseNamespace;

impl TransformFn for UppercaseNamespace {
    fn call(&self, mut message: Message) -> TransformOutcome {
        message.namespace = message.namespace.to_uppercase();
        TransformOutcome::Emit(message)
    }
}

fn parse_op(raw: &str) -> Result<Op, TransporterError> {
    match raw {
        "insert" => Ok(Op::Insert),
        "update" => Ok(Op::Update),
        "delete" => Ok(Op::Delete),
        "command" => Ok(Op::Command),
        "noop" => Ok(Op::Noop),
        other => Err(TransporterError::Configuration(format!("unknown op {other:?}, expected one of insert/update/delete/command/noop"))),
    }
}

/// A `TransformRegistry` pre-populated with the built-ins every pipeline can
/// reference by name without registering anything itself.
pub fn builtin_transforms() -> TransformRegistry {
    let mut registry = TransformRegistry::new();

    registry.register("passthrough", |_options: &Mapping| Ok(Arc::new(passthrough) as Arc<dyn TransformFn>));

    registry.register("drop_op", |options: &Mapping| {
        let op = parse_op(require_str(options, "op")?)?;
        Ok(Arc::new(DropOp::new(op)) as Arc<dyn TransformFn>)
    });

    registry.register("rename_field", |options: &Mapping| {
        let from = require_str(options, "from")?.to_string();
        let to = require_str(options, "to")?.to_string();
        Ok(Arc::new(RenameField::new(from, to)) as Arc<dyn TransformFn>)
    });

    registry.register("uppercase_namespace", |_options: &Mapping| Ok(Arc::new(UppercaseNamespace) as Arc<dyn TransformFn>));

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use transporter_core::Value;

    fn msg(op: Op) -> Message {
        Message::new(op, 0, "db.users", 0).with_field("name", "alice")
    }

    #[test]
    fn drop_op_drops_matching_and_forwards_rest() {
        let t = DropOp::new(Op::Delete);
        assert!(matches!(t.call(msg(Op::Delete)), TransformOutcome::Drop));
        assert!(matches!(t.call(msg(Op::Insert)), TransformOutcome::Emit(_)));
    }

    #[test]
    fn rename_field_moves_value_under_new_key() {
        let t = RenameField::new("name", "full_name");
        match t.call(msg(Op::Insert)) {
            TransformOutcome::Emit(m) => {
                assert!(m.data.get("name").is_none());
                assert_eq!(m.data.get("full_name").and_then(Value::as_str), Some("alice"));
            }
            _ => panic!("expected Emit"),
        }
    }

    #[test]
    fn uppercase_namespace_rewrites_namespace_only() {
        match (UppercaseNamespace).call(msg(Op::Insert)) {
            TransformOutcome::Emit(m) => assert_eq!(m.namespace, "DB.USERS"),
            _ => panic!("expected Emit"),
        }
    }

    #[test]
    fn builtin_registry_builds_every_name() {
        let registry = builtin_transforms();
        let empty = Mapping::new();
        assert!(registry.build("passthrough", &empty).is_ok());
        assert!(registry.build("uppercase_namespace", &empty).is_ok());

        let mut with_op = Mapping::new();
        with_op.insert("op".into(), "delete".into());
        assert!(registry.build("drop_op", &with_op).is_ok());

        let mut with_rename = Mapping::new();
        with_rename.insert("from".into(), "name".into());
        with_rename.insert("to".into(), "full_name".into());
        assert!(registry.build("rename_field", &with_rename).is_ok());
    }

    #[test]
    fn drop_op_rejects_unknown_op_name() {
        let mut options = Mapping::new();
        options.insert("op".into(), "delet".into());
        let err = builtin_transforms().build("drop_op", &options).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
