//! JSON Schema construction and argument validation for skills.
//!
//! Validation is deliberately forgiving about unknown parameters (forward
//! compatibility) and strict about declared ones: booleans must be real
//! booleans, integers may be numeric values equal to their integer cast,
//! arrays and objects accept any semantic container.

use serde_json::{json, Map, Value};

use crate::types::{ParamType, Skill};

/// Build the MCP `inputSchema` for a skill.
pub fn input_schema(skill: &Skill) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for param in &skill.params {
        let mut prop = Map::new();
        prop.insert("type".into(), json!(param.param_type.to_string()));
        prop.insert("description".into(), json!(param.description));
        if let Some(values) = &param.enum_values {
            prop.insert("enum".into(), json!(values));
        }
        properties.insert(param.name.clone(), Value::Object(prop));
        if param.required {
            required.push(param.name.clone());
        }
    }

    let mut schema = Map::new();
    schema.insert("type".into(), json!("object"));
    schema.insert("properties".into(), Value::Object(properties));
    if !required.is_empty() {
        schema.insert("required".into(), json!(required));
    }
    Value::Object(schema)
}

/// Check that every required parameter is present.
pub fn validate_required(skill: &Skill, args: &Value) -> Result<(), String> {
    let missing: Vec<&str> = skill
        .params
        .iter()
        .filter(|p| p.required)
        .filter(|p| args.get(&p.name).is_none())
        .map(|p| p.name.as_str())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(format!(
            "Missing required parameters: {}",
            missing.join(", ")
        ))
    }
}

/// Check every supplied argument against its declared type and enum.
/// Unknown parameters pass untouched.
pub fn validate_types(skill: &Skill, args: &Value) -> Result<(), String> {
    let map = match args {
        Value::Object(map) => map,
        Value::Null => return Ok(()),
        _ => return Err("Arguments must be a JSON object".to_string()),
    };

    for param in &skill.params {
        let value = match map.get(&param.name) {
            Some(v) => v,
            None => continue,
        };
        if !type_matches(param.param_type, value) {
            return Err(format!(
                "Parameter '{}' must be of type {} (got {})",
                param.name,
                param.param_type,
                type_name(value)
            ));
        }
        if let Some(allowed) = &param.enum_values {
            if let Some(s) = value.as_str() {
                if !allowed.iter().any(|a| a == s) {
                    return Err(format!(
                        "Parameter '{}' must be one of: {}",
                        param.name,
                        allowed.join(", ")
                    ));
                }
            }
        }
    }
    Ok(())
}

fn type_matches(expected: ParamType, value: &Value) -> bool {
    match expected {
        ParamType::String => value.is_string(),
        ParamType::Boolean => value.is_boolean(),
        ParamType::Number => value.is_number(),
        ParamType::Integer => {
            value.is_i64()
                || value.is_u64()
                || value
                    .as_f64()
                    .is_some_and(|f| f.fract() == 0.0 && f.is_finite())
        }
        ParamType::Array => value.is_array(),
        ParamType::Object => value.is_object(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Render the dry-run preview for a validated call.
pub fn dry_run_preview(skill: &Skill, args: &Value) -> String {
    let mut out = format!(
        "[DRY RUN] Would execute: {}\n{}",
        skill.name, skill.description
    );
    if let Some(hint) = skill.preview.as_ref().and_then(|p| p(args)) {
        out.push('\n');
        out.push_str(&hint);
    }
    out.push_str("\nArguments:");
    match args {
        Value::Object(map) if !map.is_empty() => {
            for (key, value) in map {
                let rendered = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                out.push_str(&format!(
                    "\n  {key}: {}",
                    crate::runner::shorten(&rendered, 120)
                ));
            }
        }
        _ => out.push_str("\n  (none)"),
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{handler_fn, ParamSpec, ParamType, Skill};
    use llamar_domain::envelope::ToolResult;
    use serde_json::json;

    fn sample_skill() -> Skill {
        Skill::new(
            "sample",
            "A sample skill",
            vec![
                ParamSpec::required("path", ParamType::String, "target path"),
                ParamSpec::optional("lines", ParamType::Integer, "line cap"),
                ParamSpec::optional("recursive", ParamType::Boolean, "recurse"),
                ParamSpec::optional("scope", ParamType::String, "where")
                    .with_enum(&["project", "global"]),
            ],
            handler_fn(|_, _| async { ToolResult::ok("done") }),
        )
    }

    #[test]
    fn schema_shape() {
        let schema = input_schema(&sample_skill());
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["path"]["type"], "string");
        assert_eq!(schema["properties"]["scope"]["enum"][0], "project");
        assert_eq!(schema["required"], json!(["path"]));
    }

    #[test]
    fn required_subset_of_declared() {
        let skill = sample_skill();
        let schema = input_schema(&skill);
        let declared: Vec<&str> = skill.params.iter().map(|p| p.name.as_str()).collect();
        for name in schema["required"].as_array().unwrap() {
            assert!(declared.contains(&name.as_str().unwrap()));
        }
    }

    #[test]
    fn missing_required_reported() {
        let err = validate_required(&sample_skill(), &json!({})).unwrap_err();
        assert_eq!(err, "Missing required parameters: path");
    }

    #[test]
    fn boolean_is_strict() {
        let skill = sample_skill();
        let err =
            validate_types(&skill, &json!({"path": "x", "recursive": "true"})).unwrap_err();
        assert!(err.contains("'recursive'"));
        assert!(err.contains("boolean"));
        assert!(validate_types(&skill, &json!({"path": "x", "recursive": true})).is_ok());
    }

    #[test]
    fn integer_accepts_integral_float() {
        let skill = sample_skill();
        assert!(validate_types(&skill, &json!({"path": "x", "lines": 5})).is_ok());
        assert!(validate_types(&skill, &json!({"path": "x", "lines": 5.0})).is_ok());
        let err = validate_types(&skill, &json!({"path": "x", "lines": 5.5})).unwrap_err();
        assert!(err.contains("'lines'"));
    }

    #[test]
    fn enum_enforced() {
        let skill = sample_skill();
        let err = validate_types(&skill, &json!({"path": "x", "scope": "nowhere"})).unwrap_err();
        assert!(err.contains("one of"));
        assert!(validate_types(&skill, &json!({"path": "x", "scope": "global"})).is_ok());
    }

    #[test]
    fn unknown_params_pass() {
        let skill = sample_skill();
        assert!(validate_types(&skill, &json!({"path": "x", "future_flag": 42})).is_ok());
    }

    #[test]
    fn preview_lists_arguments() {
        let skill = sample_skill().with_preview(|args| {
            args.get("path")
                .and_then(|p| p.as_str())
                .map(|p| format!("target: {p}"))
        });
        let preview = dry_run_preview(&skill, &json!({"path": "/tmp/a", "lines": 3}));
        assert!(preview.starts_with("[DRY RUN] Would execute: sample"));
        assert!(preview.contains("target: /tmp/a"));
        assert!(preview.contains("  path: /tmp/a"));
        assert!(preview.contains("  lines: 3"));
    }
}
