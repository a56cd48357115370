//! Reading the remote's JSON responses: assigned ids, fiscal stamps,
//! search results and structured errors.

use clinisync_domain::FiscalStamp;
use serde_json::Value;

/// Remote-assigned id. Some collections return numeric ids.
pub fn remote_id(body: &Value) -> Option<String> {
    match body.get("id")? {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

/// Human document number (`FV-1-1024`), falling back to the bare number.
pub fn document_name(body: &Value) -> Option<String> {
    match (body.get("name"), body.get("number")) {
        (Some(Value::String(name)), _) if !name.is_empty() => Some(name.clone()),
        (_, Some(Value::Number(number))) => Some(number.to_string()),
        (_, Some(Value::String(number))) if !number.is_empty() => Some(number.clone()),
        _ => None,
    }
}

/// Fiscal stamp of an electronic document, when the response carries one.
pub fn fiscal_stamp(body: &Value) -> Option<FiscalStamp> {
    let stamp = body.get("stamp")?;
    let text = |value: Option<&Value>| value.and_then(Value::as_str).map(str::to_string);
    let parsed = FiscalStamp {
        cufe: text(stamp.get("cufe")).or_else(|| text(body.get("cufe"))),
        status: text(stamp.get("status")),
        qr_code: text(stamp.get("qr")).or_else(|| text(body.get("qr"))),
    };
    (!parsed.is_empty()).then_some(parsed)
}

/// First id in a search response (`{"results": [...]}` or a bare array).
pub fn first_search_result(body: &Value) -> Option<String> {
    let results = match body {
        Value::Array(items) => items,
        Value::Object(_) => body.get("results")?.as_array()?,
        _ => return None,
    };
    results.iter().find_map(remote_id)
}

/// Messages in a document's validation-error listing. An empty list, a
/// `null` body and an empty `results` page all mean no errors.
pub fn fiscal_errors(body: &Value) -> Vec<String> {
    let items = match body {
        Value::Array(items) => items.as_slice(),
        Value::Object(_) => ["Errors", "errors", "results"]
            .iter()
            .find_map(|key| body.get(*key).and_then(Value::as_array))
            .map_or(&[] as &[Value], Vec::as_slice),
        _ => &[],
    };
    items
        .iter()
        .map(|item| match item {
            Value::String(message) => message.clone(),
            other => ["Message", "message", "Detail", "detail"]
                .iter()
                .find_map(|key| other.get(*key).and_then(Value::as_str))
                .map_or_else(|| other.to_string(), str::to_string),
        })
        .collect()
}

/// Structured remote error: `(code, detail)`.
///
/// Recognized shapes:
/// - `{"Errors": [{"Code": "...", "Message": "...", "Detail": "..."}]}`
/// - `{"error": {"code": "...", "message": "..."}}`
/// - `{"error": "...", "message": "..."}`
pub fn structured_error(body: &Value) -> Option<(Option<String>, String)> {
    let text = |value: Option<&Value>| -> Option<String> {
        match value? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    };

    if let Some(first) = body.get("Errors").and_then(Value::as_array).and_then(|e| e.first()) {
        let code = text(first.get("Code"));
        let detail = text(first.get("Message"))
            .or_else(|| text(first.get("Detail")))
            .unwrap_or_else(|| first.to_string());
        return Some((code, detail));
    }

    match body.get("error") {
        Some(inner @ Value::Object(_)) => {
            let code = text(inner.get("code"));
            let detail = text(inner.get("message")).unwrap_or_else(|| inner.to_string());
            Some((code, detail))
        }
        Some(Value::String(code)) => {
            let detail = text(body.get("message")).unwrap_or_else(|| code.clone());
            Some((Some(code.clone()), detail))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn ids_may_be_numeric() {
        assert_eq!(remote_id(&json!({"id": "R100"})), Some("R100".into()));
        assert_eq!(remote_id(&json!({"id": 42})), Some("42".into()));
        assert_eq!(remote_id(&json!({"id": ""})), None);
        assert_eq!(remote_id(&json!({})), None);
    }

    #[test]
    fn stamp_fields_are_optional() {
        let body = json!({
            "id": "R100",
            "name": "FV-1-1024",
            "stamp": {"status": "Accepted", "cufe": "a1b2c3"},
        });
        let stamp = fiscal_stamp(&body).unwrap();
        assert_eq!(stamp.cufe.as_deref(), Some("a1b2c3"));
        assert_eq!(stamp.status.as_deref(), Some("Accepted"));
        assert_eq!(document_name(&body).as_deref(), Some("FV-1-1024"));

        assert!(fiscal_stamp(&json!({"stamp": {}})).is_none());
        assert_eq!(document_name(&json!({"number": 1024})).as_deref(), Some("1024"));
    }

    #[test]
    fn search_results_shapes() {
        let paged = json!({"pagination": {"total_results": 1}, "results": [{"id": "C9"}]});
        assert_eq!(first_search_result(&paged), Some("C9".into()));
        assert_eq!(first_search_result(&json!([{"id": 7}])), Some("7".into()));
        assert_eq!(first_search_result(&json!({"results": []})), None);
    }

    #[test]
    fn recognizes_error_shapes() {
        let upper = json!({"Errors": [{"Code": "invalid_reference", "Message": "Customer not found"}]});
        assert_eq!(
            structured_error(&upper),
            Some((Some("invalid_reference".into()), "Customer not found".into()))
        );

        let nested = json!({"error": {"code": "parameter_invalid", "message": "date"}});
        assert_eq!(
            structured_error(&nested),
            Some((Some("parameter_invalid".into()), "date".into()))
        );

        let flat = json!({"error": "unauthorized", "message": "token expired"});
        assert_eq!(
            structured_error(&flat),
            Some((Some("unauthorized".into()), "token expired".into()))
        );

        assert_eq!(structured_error(&json!({"status": "ok"})), None);
    }

    #[test]
    fn fiscal_errors_accept_every_listing_shape() {
        assert!(fiscal_errors(&json!([])).is_empty());
        assert!(fiscal_errors(&Value::Null).is_empty());
        assert!(fiscal_errors(&json!({"results": []})).is_empty());

        let listed = json!([
            {"Code": "FAD06", "Message": "CUFE does not match"},
            "Customer email missing"
        ]);
        assert_eq!(fiscal_errors(&listed), vec!["CUFE does not match", "Customer email missing"]);

        let wrapped = json!({"Errors": [{"detail": "Resolution expired"}]});
        assert_eq!(fiscal_errors(&wrapped), vec!["Resolution expired"]);
    }
}
