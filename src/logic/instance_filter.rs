use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::model::{DataType, EntitySchema, Instance};

/// Filter expression accepted in the `where` clause of a search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterExpr {
    /// Logical AND - all conditions must be true
    All { all: Vec<FilterExpr> },
    /// Logical OR - any condition must be true
    Any { any: Vec<FilterExpr> },
    Not { not: Box<FilterExpr> },
    Eq { eq: (JsonPath, Value) },
    Ne { ne: (JsonPath, Value) },
    Gt { gt: (JsonPath, Value) },
    Gte { gte: (JsonPath, Value) },
    Lt { lt: (JsonPath, Value) },
    Lte { lte: (JsonPath, Value) },
    In { r#in: (JsonPath, Vec<Value>) },
    NotIn { not_in: (JsonPath, Vec<Value>) },
    /// Substring for strings, membership for arrays (to-many relationships)
    Contains { contains: (JsonPath, Value) },
    Exists { exists: JsonPath },
    NotExists { not_exists: JsonPath },
}

/// Field reference, either `$.title` or plain `title`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JsonPath(pub String);

impl JsonPath {
    pub fn key(&self) -> Result<&str> {
        let key = self.0.strip_prefix("$.").unwrap_or(&self.0);
        if key.is_empty() || key.starts_with('$') || key.contains('.') {
            return Err(anyhow!("Invalid field path: {}", self.0));
        }
        Ok(key)
    }

    /// Value of the referenced field; `None` when the field is unset
    pub fn extract(&self, schema: &EntitySchema, instance: &Instance) -> Result<Option<Value>> {
        let key = self.key()?;
        if key == schema.id_attribute {
            return Ok(Some(instance.id.to_json()));
        }
        Ok(instance.get(key).cloned())
    }
}

impl FilterExpr {
    /// Collect every field the expression reads.
    pub fn collect_keys(&self, keys: &mut BTreeSet<String>) -> Result<()> {
        match self {
            FilterExpr::All { all: exprs } | FilterExpr::Any { any: exprs } => {
                if exprs.is_empty() {
                    return Err(anyhow!("Empty logical group in filter"));
                }
                for expr in exprs {
                    expr.collect_keys(keys)?;
                }
            }
            FilterExpr::Not { not } => not.collect_keys(keys)?,
            FilterExpr::Eq { eq: (path, _) }
            | FilterExpr::Ne { ne: (path, _) }
            | FilterExpr::Gt { gt: (path, _) }
            | FilterExpr::Gte { gte: (path, _) }
            | FilterExpr::Lt { lt: (path, _) }
            | FilterExpr::Lte { lte: (path, _) }
            | FilterExpr::In { r#in: (path, _) }
            | FilterExpr::NotIn { not_in: (path, _) }
            | FilterExpr::Contains { contains: (path, _) }
            | FilterExpr::Exists { exists: path }
            | FilterExpr::NotExists { not_exists: path } => {
                keys.insert(path.key()?.to_string());
            }
        }
        Ok(())
    }
}

/// Instance filter evaluator
pub struct InstanceFilterEvaluator;

impl InstanceFilterEvaluator {
    /// Keep the instances matching the expression. Evaluation errors count
    /// as a non-match.
    pub fn filter_instances(
        schema: &EntitySchema,
        instances: Vec<Instance>,
        filter: &FilterExpr,
    ) -> Vec<Instance> {
        instances
            .into_iter()
            .filter(|instance| Self::evaluate_filter(schema, instance, filter).unwrap_or(false))
            .collect()
    }

    pub fn evaluate_filter(
        schema: &EntitySchema,
        instance: &Instance,
        filter: &FilterExpr,
    ) -> Result<bool> {
        match filter {
            FilterExpr::All { all } => {
                for expr in all {
                    if !Self::evaluate_filter(schema, instance, expr)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }

            FilterExpr::Any { any } => {
                for expr in any {
                    if Self::evaluate_filter(schema, instance, expr)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }

            FilterExpr::Not { not } => Ok(!Self::evaluate_filter(schema, instance, not)?),

            FilterExpr::Eq { eq: (path, value) } => {
                let extracted = path.extract(schema, instance)?;
                Ok(Self::equals(extracted.as_ref(), value))
            }

            FilterExpr::Ne { ne: (path, value) } => {
                let extracted = path.extract(schema, instance)?;
                Ok(!Self::equals(extracted.as_ref(), value))
            }

            FilterExpr::Gt { gt: (path, value) } => {
                let extracted = path.extract(schema, instance)?;
                Ok(compare_values(extracted.as_ref(), value) == Some(Ordering::Greater))
            }

            FilterExpr::Gte { gte: (path, value) } => {
                let extracted = path.extract(schema, instance)?;
                Ok(matches!(
                    compare_values(extracted.as_ref(), value),
                    Some(Ordering::Greater | Ordering::Equal)
                ))
            }

            FilterExpr::Lt { lt: (path, value) } => {
                let extracted = path.extract(schema, instance)?;
                Ok(compare_values(extracted.as_ref(), value) == Some(Ordering::Less))
            }

            FilterExpr::Lte { lte: (path, value) } => {
                let extracted = path.extract(schema, instance)?;
                Ok(matches!(
                    compare_values(extracted.as_ref(), value),
                    Some(Ordering::Less | Ordering::Equal)
                ))
            }

            FilterExpr::In { r#in: (path, values) } => {
                let extracted = path.extract(schema, instance)?;
                Ok(values.iter().any(|v| Self::equals(extracted.as_ref(), v)))
            }

            FilterExpr::NotIn { not_in: (path, values) } => {
                let extracted = path.extract(schema, instance)?;
                // An unset field is not in any list
                Ok(!values.iter().any(|v| Self::equals(extracted.as_ref(), v)))
            }

            FilterExpr::Contains { contains: (path, needle) } => {
                let extracted = path.extract(schema, instance)?;
                match (extracted, needle) {
                    (Some(Value::String(s)), Value::String(sub)) => Ok(s.contains(sub.as_str())),
                    (Some(Value::Array(items)), needle) => Ok(items.contains(needle)),
                    _ => Ok(false),
                }
            }

            FilterExpr::Exists { exists: path } => Ok(path.extract(schema, instance)?.is_some()),

            FilterExpr::NotExists { not_exists: path } => {
                Ok(path.extract(schema, instance)?.is_none())
            }
        }
    }

    /// Numbers compare by value so `1` equals `1.0`.
    fn equals(left: Option<&Value>, right: &Value) -> bool {
        match (left, right) {
            (None, Value::Null) => true,
            (Some(Value::Number(_)), Value::Number(_)) => {
                compare_values(left, right) == Some(Ordering::Equal)
            }
            (Some(l), r) => l == r,
            (None, _) => false,
        }
    }
}

/// Ordering between two JSON scalars. Strings compare as text; a string
/// compared against a number is read as a number. Incomparable pairs yield
/// `None`.
pub fn compare_values(left: Option<&Value>, right: &Value) -> Option<Ordering> {
    match (left?, right) {
        (Value::Number(l), Value::Number(r)) => l.as_f64()?.partial_cmp(&r.as_f64()?),
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        (Value::Number(l), Value::String(r)) => l.as_f64()?.partial_cmp(&r.parse::<f64>().ok()?),
        (Value::String(l), Value::Number(r)) => l.parse::<f64>().ok()?.partial_cmp(&r.as_f64()?),
        (Value::Bool(l), Value::Bool(r)) => Some(l.cmp(r)),
        _ => None,
    }
}

/// Total order used for sorting search results: unset and null first, then
/// by JSON type, then by value. Strings sort as text unless the attribute is
/// declared numeric, in which case parsable strings come first by value.
pub fn sort_order(
    data_type: Option<DataType>,
    left: Option<&Value>,
    right: Option<&Value>,
) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(Value::Array(_)) => 4,
            Some(Value::Object(_)) => 5,
        }
    }

    fn number(value: &serde_json::Number) -> f64 {
        value.as_f64().unwrap_or(f64::NAN)
    }

    match (left, right) {
        (Some(Value::Bool(l)), Some(Value::Bool(r))) => l.cmp(r),
        (Some(Value::Number(l)), Some(Value::Number(r))) => number(l).total_cmp(&number(r)),
        (Some(Value::String(l)), Some(Value::String(r))) => match data_type {
            Some(DataType::Integer | DataType::Number) => {
                match (l.parse::<f64>().ok(), r.parse::<f64>().ok()) {
                    (Some(lf), Some(rf)) => lf.total_cmp(&rf).then_with(|| l.cmp(r)),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => l.cmp(r),
                }
            }
            _ => l.cmp(r),
        },
        _ => rank(left).cmp(&rank(right)),
    }
}

/// Parse a `where` clause from JSON.
pub fn parse_filter_expr(value: Value) -> Result<FilterExpr> {
    serde_json::from_value(value).map_err(|e| anyhow!("Failed to parse filter expression: {}", e))
}
