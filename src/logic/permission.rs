use serde_json::Value;

use crate::error::{GatewayError, GatewayResult};
use crate::model::{Cardinality, FieldAccess, GatewayRequest, Instance, Representation};
use crate::store::Delegate;

/// Serialize an instance with only the keys the caller may read. Unset
/// keys are emitted as `null` (or `[]` for to-many relationships) so the
/// shape of a representation does not depend on stored state.
pub fn represent<D: Delegate>(
    delegate: &D,
    request: &GatewayRequest,
    instance: &Instance,
) -> Representation {
    let schema = &request.entity;
    let mut representation = Representation::new();

    if delegate
        .permission(request, instance, Some(schema.id_attribute.as_str()))
        .can_read()
    {
        representation.insert(schema.id_attribute.clone(), instance.id.to_json());
    }

    for attr in &schema.attributes {
        if attr.name == schema.id_attribute
            || !delegate.permission(request, instance, Some(attr.name.as_str())).can_read()
        {
            continue;
        }
        let value = instance.get(&attr.name).cloned().unwrap_or(Value::Null);
        representation.insert(attr.name.clone(), value);
    }

    for rel in &schema.relationships {
        if !delegate.permission(request, instance, Some(rel.name.as_str())).can_read() {
            continue;
        }
        let value = instance.get(&rel.name).cloned().unwrap_or(match rel.cardinality {
            Cardinality::One => Value::Null,
            Cardinality::Many => Value::Array(Vec::new()),
        });
        representation.insert(rel.name.clone(), value);
    }

    representation
}

/// Instance-level gate; `None` asks the delegate about the instance itself.
pub fn require_access<D: Delegate>(
    delegate: &D,
    request: &GatewayRequest,
    instance: &Instance,
    key: Option<&str>,
    needed: FieldAccess,
) -> GatewayResult<()> {
    let granted = delegate.permission(request, instance, key);
    if granted >= needed {
        Ok(())
    } else {
        Err(GatewayError::Forbidden(match key {
            Some(key) => format!(
                "{:?} access to '{}' of {} {} denied",
                needed, key, request.entity.name, instance.id
            ),
            None => format!(
                "{:?} access to {} {} denied",
                needed, request.entity.name, instance.id
            ),
        }))
    }
}
