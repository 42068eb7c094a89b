use itertools::Itertools;
use serde_json::Value;
use std::collections::BTreeSet;

use crate::error::{GatewayError, GatewayResult};
use crate::logic::gateway::{finish, Gateway};
use crate::logic::{sort_order, InstanceFilterEvaluator, JsonPath};
use crate::model::{GatewayRequest, GatewayResponse, Instance, RequestKind, SearchRequest};
use crate::store::{DataSource, Delegate, Transaction};

impl<S: DataSource, D: Delegate> Gateway<S, D> {
    /// Run a search and answer with the matching identifiers. Instances the
    /// caller cannot see, or whose filtered/sorted fields it cannot read,
    /// drop out of the result instead of failing the search.
    pub(crate) async fn search(
        &self,
        request: &GatewayRequest,
        search: &SearchRequest,
    ) -> GatewayResult<GatewayResponse> {
        let schema = &request.entity;
        let keys = search_keys(request, search)?;

        let mut transaction = self.source.begin(RequestKind::Search).await?;
        let result = transaction
            .scan(&schema.name)
            .await
            .map_err(GatewayError::from);
        let instances = finish(transaction, result).await?;

        let visible: Vec<Instance> = instances
            .into_iter()
            .filter(|instance| self.searchable(request, instance, &keys))
            .collect();

        let matched = match &search.where_clause {
            Some(filter) => InstanceFilterEvaluator::filter_instances(schema, visible, filter),
            None => visible,
        };

        let ordered: Vec<Instance> = match search.sort_key() {
            Some(sort) => {
                let path = JsonPath(sort.key.to_string());
                let data_type = path
                    .key()
                    .ok()
                    .and_then(|key| schema.get_attribute(key))
                    .map(|attr| attr.data_type);
                matched
                    .into_iter()
                    .map(|instance| {
                        let value = path.extract(schema, &instance).ok().flatten();
                        (value, instance)
                    })
                    .sorted_by(|(a, _), (b, _)| {
                        let order = sort_order(data_type, a.as_ref(), b.as_ref());
                        if sort.ascending {
                            order
                        } else {
                            order.reverse()
                        }
                    })
                    .map(|(_, instance)| instance)
                    .collect()
            }
            None => matched,
        };

        let ids: Vec<Value> = ordered
            .iter()
            .skip(search.offset.unwrap_or(0))
            .take(search.limit.unwrap_or(usize::MAX))
            .map(|instance| instance.id.to_json())
            .collect();

        log::debug!("Search on {} matched {} instances", schema.name, ids.len());
        Ok(GatewayResponse::ok(Value::Array(ids)))
    }

    fn searchable(
        &self,
        request: &GatewayRequest,
        instance: &Instance,
        keys: &BTreeSet<String>,
    ) -> bool {
        self.delegate.permission(request, instance, None).can_read()
            && keys.iter().all(|key| {
                self.delegate
                    .permission(request, instance, Some(key.as_str()))
                    .can_read()
            })
    }
}

/// Fields read by the filter and the sort, checked against the schema
/// before any transaction is opened.
fn search_keys(request: &GatewayRequest, search: &SearchRequest) -> GatewayResult<BTreeSet<String>> {
    let schema = &request.entity;
    let mut keys = BTreeSet::new();

    if let Some(filter) = &search.where_clause {
        filter
            .collect_keys(&mut keys)
            .map_err(|e| GatewayError::Validation(e.to_string()))?;
    }
    if let Some(sort) = search.sort_key() {
        let key = JsonPath(sort.key.to_string())
            .key()
            .map_err(|e| GatewayError::Validation(format!("Invalid sort key: {}", e)))?
            .to_string();
        keys.insert(key);
    }

    if let Some(unknown) = keys
        .iter()
        .find(|key| **key != schema.id_attribute && schema.field(key).is_none())
    {
        return Err(GatewayError::Validation(format!(
            "{} has no field '{}'",
            schema.name, unknown
        )));
    }
    Ok(keys)
}
