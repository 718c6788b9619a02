//! Wire envelope to [`ChangeRecord`].

use serde_json::Value;
use tributary_core::{
    error::{Result, TributaryError},
    ChangeRecord, Fields, Operation, SourceMessage,
};

/// Decode one message.
///
/// Returns `Ok(None)` for tombstones: a missing or empty value, a JSON
/// `null`, or a schema-wrapped envelope whose payload is `null`.
pub fn decode(message: &SourceMessage) -> Result<Option<ChangeRecord>> {
    let Some(bytes) = message.value.as_deref().filter(|v| !v.is_empty()) else {
        return Ok(None);
    };

    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| TributaryError::Decode(format!("{}: {}", message.position(), e)))?;

    let envelope = match unwrap_payload(value) {
        Value::Null => return Ok(None),
        Value::Object(map) => map,
        other => {
            return Err(TributaryError::Decode(format!(
                "{}: envelope is not an object: {}",
                message.position(),
                other
            )))
        }
    };

    let op = match envelope.get("op") {
        Some(Value::String(op)) => op.as_str(),
        Some(other) => {
            return Err(TributaryError::Decode(format!(
                "{}: op is not a string: {}",
                message.position(),
                other
            )))
        }
        None => {
            return Err(TributaryError::Decode(format!(
                "{}: missing op",
                message.position()
            )))
        }
    };
    let operation = Operation::from_code(op).ok_or_else(|| {
        TributaryError::UnknownOperation(format!("{}: {:?}", message.position(), op))
    })?;

    let before = fields(&envelope, "before", message)?;
    let after = fields(&envelope, "after", message)?;

    match operation {
        Operation::Delete if before.is_none() => {
            return Err(TributaryError::Decode(format!(
                "{}: delete without before",
                message.position()
            )))
        }
        Operation::Delete => {}
        _ if after.is_none() => {
            return Err(TributaryError::Decode(format!(
                "{}: {} without after",
                message.position(),
                op
            )))
        }
        _ => {}
    }

    Ok(Some(ChangeRecord {
        table: message.table().to_string(),
        operation,
        before,
        // a delete describes the row through `before` only
        after: if operation.is_delete() { None } else { after },
    }))
}

/// Strip the `{schema, payload}` wrapper added by JSON converters with
/// schemas enabled
fn unwrap_payload(value: Value) -> Value {
    match value {
        Value::Object(mut map) if !map.contains_key("op") && map.contains_key("payload") => {
            map.remove("payload").unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn fields(envelope: &Fields, name: &str, message: &SourceMessage) -> Result<Option<Fields>> {
    match envelope.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map.clone())),
        Some(other) => Err(TributaryError::Decode(format!(
            "{}: {} is not an object: {}",
            message.position(),
            name,
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(value: Option<Value>) -> SourceMessage {
        SourceMessage {
            topic: "university_db.public.departments".into(),
            partition: 0,
            offset: 0,
            key: None,
            value: value.map(|v| serde_json::to_vec(&v).unwrap()),
        }
    }

    #[test]
    fn tombstones_produce_nothing() {
        assert_eq!(decode(&message(None)).unwrap(), None);
        assert_eq!(decode(&message(Some(Value::Null))).unwrap(), None);
        assert_eq!(
            decode(&message(Some(json!({"schema": {}, "payload": null})))).unwrap(),
            None
        );

        let mut empty = message(None);
        empty.value = Some(Vec::new());
        assert_eq!(decode(&empty).unwrap(), None);
    }

    #[test]
    fn decodes_bare_and_wrapped_envelopes() {
        let envelope = json!({
            "op": "c",
            "before": null,
            "after": {"dept_id": 7, "institute_id": 2, "name": "CS"},
            "source": {"table": "departments"}
        });
        let bare = decode(&message(Some(envelope.clone()))).unwrap().unwrap();
        let wrapped = decode(&message(Some(json!({"schema": {}, "payload": envelope}))))
            .unwrap()
            .unwrap();

        assert_eq!(bare, wrapped);
        assert_eq!(bare.table, "departments");
        assert_eq!(bare.operation, Operation::Create);
        assert_eq!(bare.before, None);
        assert_eq!(bare.after.unwrap()["dept_id"], 7);
    }

    #[test]
    fn delete_keeps_only_before() {
        let record = decode(&message(Some(json!({
            "op": "d",
            "before": {"dept_id": 7, "institute_id": 2},
            "after": {}
        }))))
        .unwrap()
        .unwrap();
        assert!(record.operation.is_delete());
        assert_eq!(record.after, None);
        assert_eq!(record.row().unwrap()["dept_id"], 7);
    }

    #[test]
    fn structural_failures_are_decode_errors() {
        let cases = [
            json!({"before": null, "after": {"a": 1}}),
            json!({"op": 3, "after": {"a": 1}}),
            json!({"op": "d", "after": {"a": 1}}),
            json!({"op": "u", "before": {"a": 1}}),
            json!({"op": "c", "after": [1, 2]}),
            json!([1, 2, 3]),
        ];
        for case in cases {
            let err = decode(&message(Some(case.clone()))).unwrap_err();
            assert!(matches!(err, TributaryError::Decode(_)), "{case}: {err}");
        }

        let mut garbage = message(None);
        garbage.value = Some(b"{not json".to_vec());
        assert!(decode(&garbage).unwrap_err().is_decode());
    }

    #[test]
    fn unknown_operation_is_reported() {
        let err = decode(&message(Some(json!({"op": "t", "after": {}})))).unwrap_err();
        assert!(matches!(err, TributaryError::UnknownOperation(_)));
        assert!(err.is_decode());
    }
}
