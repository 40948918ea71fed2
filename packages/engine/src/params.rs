use std::collections::HashMap;

use common::ParameterValue;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    SqlErr,
};
use serde_json::{Map, Value};

use crate::entity::{parameter_binding, plugin_parameter};
use crate::error::EngineError;

/// A declared parameter together with the value resolved for it.
pub type ResolvedParameter = (plugin_parameter::Model, ParameterValue);

/// Resolve one raw value against its declaration.
///
/// `None` (or JSON null) means the client sent nothing: required parameters
/// fail, optional ones fall back to their default or stay unbound.
pub fn resolve_value(
    param: &plugin_parameter::Model,
    raw: Option<&Value>,
) -> Result<Option<ParameterValue>, EngineError> {
    match raw {
        None | Some(Value::Null) => {
            if param.optional {
                Ok(param.default_value())
            } else {
                Err(EngineError::Validation(format!(
                    "parameter '{}' is required",
                    param.name
                )))
            }
        }
        Some(raw) => ParameterValue::parse(param.kind, raw)
            .map(Some)
            .map_err(|e| EngineError::parameter(&param.name, e)),
    }
}

/// Validate a whole submission before anything is written.
///
/// Names not declared by the plugin are rejected. The result holds one entry
/// per parameter that ends up bound, in declaration order.
pub fn validate_parameters(
    params: &[plugin_parameter::Model],
    raw: &Map<String, Value>,
) -> Result<Vec<ResolvedParameter>, EngineError> {
    let declared: HashMap<&str, &plugin_parameter::Model> =
        params.iter().map(|p| (p.name.as_str(), p)).collect();
    if let Some(unknown) = raw.keys().find(|k| !declared.contains_key(k.as_str())) {
        return Err(EngineError::Validation(format!(
            "unknown parameter '{unknown}'"
        )));
    }

    let mut resolved = Vec::new();
    for param in params {
        if let Some(value) = resolve_value(param, raw.get(&param.name))? {
            resolved.push((param.clone(), value));
        }
    }
    Ok(resolved)
}

/// Typed parameter bindings of plugin instances.
pub struct ParameterStore<'a, C: ConnectionTrait> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> ParameterStore<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    /// Validate `raw` and persist it as the binding of `param` on `instance_id`.
    ///
    /// Returns `None` when an optional parameter without default was omitted.
    pub async fn bind(
        &self,
        instance_id: i32,
        param: &plugin_parameter::Model,
        raw: Option<&Value>,
    ) -> Result<Option<parameter_binding::Model>, EngineError> {
        match resolve_value(param, raw)? {
            Some(value) => self.insert(instance_id, param, &value).await.map(Some),
            None => Ok(None),
        }
    }

    /// Persist already-validated values.
    pub async fn bind_all(
        &self,
        instance_id: i32,
        resolved: &[ResolvedParameter],
    ) -> Result<(), EngineError> {
        for (param, value) in resolved {
            self.insert(instance_id, param, value).await?;
        }
        Ok(())
    }

    async fn insert(
        &self,
        instance_id: i32,
        param: &plugin_parameter::Model,
        value: &ParameterValue,
    ) -> Result<parameter_binding::Model, EngineError> {
        if value.kind() != param.kind {
            return Err(EngineError::Validation(format!(
                "parameter '{}' expects {}, got {}",
                param.name,
                param.kind,
                value.kind()
            )));
        }

        let row = parameter_binding::ActiveModel {
            plugin_inst_id: Set(instance_id),
            plugin_param_id: Set(param.id),
            kind: Set(param.kind),
            value: Set(value.to_json()),
            ..Default::default()
        };

        row.insert(self.conn).await.map_err(|e| {
            if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                EngineError::Validation(format!(
                    "parameter '{}' is already bound on instance {instance_id}",
                    param.name
                ))
            } else {
                e.into()
            }
        })
    }

    /// Bindings of an instance with their declarations, in declaration order.
    pub async fn bindings(&self, instance_id: i32) -> Result<Vec<ResolvedParameter>, EngineError> {
        let rows = parameter_binding::Entity::find()
            .filter(parameter_binding::Column::PluginInstId.eq(instance_id))
            .find_also_related(plugin_parameter::Entity)
            .order_by_asc(parameter_binding::Column::PluginParamId)
            .all(self.conn)
            .await?;

        rows.into_iter()
            .map(|(binding, param)| {
                let param = param.ok_or_else(|| {
                    EngineError::NotFound(format!("plugin parameter {}", binding.plugin_param_id))
                })?;
                let value = ParameterValue::parse(binding.kind, &binding.value)
                    .map_err(|e| EngineError::parameter(&param.name, e))?;
                Ok((param, value))
            })
            .collect()
    }
}
