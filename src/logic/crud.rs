use serde_json::{Map, Value};

use crate::error::{GatewayError, GatewayResult};
use crate::logic::gateway::{finish, Gateway};
use crate::logic::{check_attribute_value, represent, require_access, resolve_relationship_value};
use crate::model::{
    Field, FieldAccess, GatewayRequest, GatewayResponse, Instance, RequestKind, ResourceId,
};
use crate::store::{DataSource, Delegate, Transaction};

impl<S: DataSource, D: Delegate> Gateway<S, D> {
    pub(crate) async fn create(
        &self,
        request: &GatewayRequest,
        payload: &Map<String, Value>,
    ) -> GatewayResult<GatewayResponse> {
        let schema = &request.entity;
        let mut transaction = self.source.begin(RequestKind::Create).await?;

        let result = async {
            let id = self.source.new_resource_id(schema).await?;
            let mut instance = Instance::new(schema.name.clone(), id);
            for attr in &schema.attributes {
                match &attr.default {
                    Some(default) if attr.name != schema.id_attribute => {
                        instance.set(attr.name.clone(), default.clone());
                    }
                    _ => {}
                }
            }
            self.apply_payload(request, &mut transaction, &mut instance, payload)
                .await?;
            transaction.insert(instance.clone()).await?;
            Ok::<_, GatewayError>(instance)
        }
        .await;

        let instance = finish(transaction, result).await?;
        log::debug!("Created {} {}", schema.name, instance.id);
        Ok(GatewayResponse::created(Value::Object(represent(
            &*self.delegate,
            request,
            &instance,
        ))))
    }

    pub(crate) async fn read(
        &self,
        request: &GatewayRequest,
        id: &ResourceId,
    ) -> GatewayResult<GatewayResponse> {
        let mut transaction = self.source.begin(RequestKind::Read).await?;
        let result = self.fetch_existing(request, &mut transaction, id).await;
        let instance = finish(transaction, result).await?;

        require_access(&*self.delegate, request, &instance, None, FieldAccess::ReadOnly)?;
        Ok(GatewayResponse::ok(Value::Object(represent(
            &*self.delegate,
            request,
            &instance,
        ))))
    }

    pub(crate) async fn update(
        &self,
        request: &GatewayRequest,
        id: &ResourceId,
        payload: &Map<String, Value>,
    ) -> GatewayResult<GatewayResponse> {
        let mut transaction = self.source.begin(RequestKind::Update).await?;

        let result = async {
            let mut instance = self.fetch_existing(request, &mut transaction, id).await?;
            require_access(&*self.delegate, request, &instance, None, FieldAccess::ReadWrite)?;
            self.apply_payload(request, &mut transaction, &mut instance, payload)
                .await?;
            transaction.save(instance.clone()).await?;
            Ok::<_, GatewayError>(instance)
        }
        .await;

        let instance = finish(transaction, result).await?;
        Ok(GatewayResponse::ok(Value::Object(represent(
            &*self.delegate,
            request,
            &instance,
        ))))
    }

    pub(crate) async fn delete(
        &self,
        request: &GatewayRequest,
        id: &ResourceId,
    ) -> GatewayResult<GatewayResponse> {
        let schema = &request.entity;
        let mut transaction = self.source.begin(RequestKind::Delete).await?;

        let result = async {
            let instance = self.fetch_existing(request, &mut transaction, id).await?;
            require_access(&*self.delegate, request, &instance, None, FieldAccess::ReadWrite)?;
            if !transaction.delete(&schema.name, id).await? {
                return Err(GatewayError::NotFound(format!("{} {} not found", schema.name, id)));
            }
            Ok::<_, GatewayError>(())
        }
        .await;

        finish(transaction, result).await?;
        log::debug!("Deleted {} {}", schema.name, id);
        Ok(GatewayResponse::no_content())
    }

    pub(crate) async fn fetch_existing(
        &self,
        request: &GatewayRequest,
        transaction: &mut S::Transaction,
        id: &ResourceId,
    ) -> GatewayResult<Instance> {
        let schema = &request.entity;
        transaction
            .fetch(&schema.name, id)
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("{} {} not found", schema.name, id)))
    }

    /// Write the permitted, known keys of a payload onto an instance.
    /// Unknown keys, the identifying attribute and keys without ReadWrite
    /// access are skipped; a badly typed value fails the whole request.
    async fn apply_payload(
        &self,
        request: &GatewayRequest,
        transaction: &mut S::Transaction,
        instance: &mut Instance,
        payload: &Map<String, Value>,
    ) -> GatewayResult<()> {
        let schema = &request.entity;

        for (key, value) in payload {
            if *key == schema.id_attribute {
                log::debug!("Ignoring client-supplied identifier for {}", schema.name);
                continue;
            }
            let Some(field) = schema.field(key) else {
                log::debug!("Ignoring unknown key '{}' for {}", key, schema.name);
                continue;
            };
            if !self
                .delegate
                .permission(request, instance, Some(key.as_str()))
                .can_write()
            {
                log::debug!("Dropping '{}' of {}: not writable", key, schema.name);
                continue;
            }

            let stored = match field {
                Field::Attribute(attr) => {
                    check_attribute_value(schema, attr, value)?;
                    value.clone()
                }
                Field::Relationship(rel) => {
                    let target = self.registry.entity(&rel.target).ok_or_else(|| {
                        GatewayError::Schema(format!("Unknown entity '{}'", rel.target))
                    })?;
                    resolve_relationship_value(transaction, rel, target, value).await?
                }
            };
            instance.set(key.clone(), stored);
        }

        Ok(())
    }
}
