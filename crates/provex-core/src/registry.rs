//! Provider metadata, command bindings and provider resolution.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::adapter::{Fetcher, ProviderAdapter};
use crate::catalog::StandardCommand;
use crate::credentials::Credentials;
use crate::error::{CommandError, LoadingError};
use crate::provider_policy::ProviderPolicy;
use crate::schema::{FieldSpec, Schema};

/// Static description of a vendor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderInfo {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    /// Credential fields that must be configured before the provider is usable.
    pub credentials: Vec<String>,
}

impl ProviderInfo {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            website: None,
            credentials: Vec::new(),
        }
    }

    pub fn with_website(mut self, website: impl Into<String>) -> Self {
        self.website = Some(website.into());
        self
    }

    pub fn with_credential(mut self, field: impl Into<String>) -> Self {
        self.credentials.push(field.into());
        self
    }
}

/// How one provider serves a command, as declared by a plugin.
pub struct BindingSpec {
    provider: String,
    adapter: Arc<dyn ProviderAdapter>,
    query_extras: Vec<FieldSpec>,
    record_extras: Vec<FieldSpec>,
    unsupported: Vec<String>,
}

impl BindingSpec {
    pub fn new<F: Fetcher>(provider: impl Into<String>, fetcher: F) -> Self {
        Self::from_adapter(provider, Arc::new(fetcher))
    }

    pub fn from_adapter(provider: impl Into<String>, adapter: Arc<dyn ProviderAdapter>) -> Self {
        Self {
            provider: provider.into(),
            adapter,
            query_extras: Vec::new(),
            record_extras: Vec::new(),
            unsupported: Vec::new(),
        }
    }

    /// Provider-specific query field, or an override of a standard one.
    pub fn with_query_field(mut self, field: FieldSpec) -> Self {
        self.query_extras.push(field);
        self
    }

    pub fn with_record_field(mut self, field: FieldSpec) -> Self {
        self.record_extras.push(field);
        self
    }

    /// Standard query field this provider cannot honor.
    pub fn unsupported(mut self, field: impl Into<String>) -> Self {
        self.unsupported.push(field.into());
        self
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }
}

impl Debug for BindingSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingSpec")
            .field("provider", &self.provider)
            .field("unsupported", &self.unsupported)
            .finish_non_exhaustive()
    }
}

/// A provider bound to a command, with schemas merged against the standard ones.
pub struct ProviderBinding {
    provider: String,
    adapter: Arc<dyn ProviderAdapter>,
    query_extras: Schema,
    query_schema: Schema,
    record_schema: Schema,
    unsupported: Vec<String>,
}

impl ProviderBinding {
    pub(crate) fn build(
        path: &str,
        standard_query: &Schema,
        standard_record: &Schema,
        spec: BindingSpec,
    ) -> Result<Self, LoadingError> {
        let provider = spec.provider;

        for name in &spec.unsupported {
            if let Some(field) = standard_query.field(name) {
                if field.required && field.default.is_none() {
                    return Err(LoadingError::UnresolvableBinding {
                        path: path.to_owned(),
                        provider,
                        field: name.clone(),
                    });
                }
            }
        }

        let tag = |fields: Vec<FieldSpec>, standard: &Schema| -> Vec<FieldSpec> {
            fields
                .into_iter()
                .map(|field| {
                    if let Some(base) = standard.field(&field.name) {
                        if base.field_type != field.field_type {
                            warn!(
                                path,
                                provider = %provider,
                                field = %field.name,
                                "provider redeclares a standard field with another type; standard type kept"
                            );
                        }
                    }
                    field.declared_by(&provider)
                })
                .collect()
        };

        let query_extras = Schema::new(
            format!("{}[{provider}]", standard_query.name()),
            tag(spec.query_extras, standard_query),
        )?;
        let record_extras = Schema::new(
            format!("{}[{provider}]", standard_record.name()),
            tag(spec.record_extras, standard_record),
        )?;

        let served = Schema::new(
            standard_query.name(),
            standard_query
                .fields()
                .iter()
                .filter(|field| !spec.unsupported.contains(&field.name))
                .cloned()
                .collect(),
        )?;
        let query_schema = Schema::merge(&served, &query_extras)?;
        let record_schema = Schema::merge(standard_record, &record_extras)?;

        Ok(Self {
            provider,
            adapter: spec.adapter,
            query_extras,
            query_schema,
            record_schema,
            unsupported: spec.unsupported,
        })
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn adapter(&self) -> &Arc<dyn ProviderAdapter> {
        &self.adapter
    }

    /// Provider-declared query fields only.
    pub fn query_extras(&self) -> &Schema {
        &self.query_extras
    }

    /// Standard query fields the provider serves plus its extras.
    pub fn query_schema(&self) -> &Schema {
        &self.query_schema
    }

    pub fn record_schema(&self) -> &Schema {
        &self.record_schema
    }

    pub fn unsupported(&self) -> &[String] {
        &self.unsupported
    }

    pub fn policy(&self) -> ProviderPolicy {
        self.adapter.policy()
    }
}

impl Debug for ProviderBinding {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderBinding")
            .field("provider", &self.provider)
            .field("query_schema", &self.query_schema.name())
            .field("record_schema", &self.record_schema.name())
            .field("unsupported", &self.unsupported)
            .finish_non_exhaustive()
    }
}

/// Registered providers and the preference order used when none is named.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<ProviderInfo>,
    priorities: HashMap<String, i32>,
}

impl ProviderRegistry {
    pub(crate) fn register(&mut self, info: ProviderInfo) -> Result<(), LoadingError> {
        if self.get(&info.name).is_some() {
            return Err(LoadingError::DuplicateProvider {
                provider: info.name,
            });
        }
        self.providers.push(info);
        Ok(())
    }

    pub(crate) fn set_priorities(&mut self, priorities: HashMap<String, i32>) {
        self.priorities = priorities;
    }

    pub fn get(&self, name: &str) -> Option<&ProviderInfo> {
        self.providers.iter().find(|info| info.name == name)
    }

    pub fn providers(&self) -> &[ProviderInfo] {
        &self.providers
    }

    /// Whether `name` is registered and all its credential fields are configured.
    pub fn is_usable(&self, name: &str, credentials: &Credentials) -> bool {
        self.get(name)
            .is_some_and(|info| credentials.satisfies(name, &info.credentials))
    }

    fn missing_credentials(&self, name: &str, credentials: &Credentials) -> Vec<String> {
        self.get(name)
            .map(|info| {
                info.credentials
                    .iter()
                    .filter(|field| {
                        credentials
                            .provider(name)
                            .and_then(|fields| fields.get(field))
                            .is_none()
                    })
                    .map(|field| format!("{name}.{field}"))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Bindings of `command` in preference order: higher priority first,
    /// declaration order among equals.
    pub fn ordered<'c>(&self, command: &'c StandardCommand) -> Vec<&'c ProviderBinding> {
        let mut bindings: Vec<&ProviderBinding> = command.bindings().iter().collect();
        bindings.sort_by_key(|binding| {
            std::cmp::Reverse(
                self.priorities
                    .get(binding.provider())
                    .copied()
                    .unwrap_or_default(),
            )
        });
        bindings
    }

    /// Pick the provider that will serve `command`.
    ///
    /// An explicit provider must be bound to the command and have its
    /// credentials configured. Otherwise the first usable binding in
    /// [`ordered`](Self::ordered) wins. The same inputs always yield the
    /// same binding.
    pub fn resolve<'c>(
        &self,
        command: &'c StandardCommand,
        explicit: Option<&str>,
        credentials: &Credentials,
    ) -> Result<&'c ProviderBinding, CommandError> {
        if let Some(name) = explicit {
            let binding = command.binding(name).ok_or_else(|| {
                CommandError::invalid_option(format!(
                    "provider '{name}' is not available for '{}'; choose one of: {}",
                    command.path(),
                    command.providers().join(", ")
                ))
            })?;
            if !self.is_usable(name, credentials) {
                return Err(CommandError::ProviderAuth {
                    command: command.path().to_owned(),
                    detail: format!(
                        "provider '{name}' is missing credentials: {}",
                        self.missing_credentials(name, credentials).join(", ")
                    ),
                });
            }
            return Ok(binding);
        }

        let ordered = self.ordered(command);
        if let Some(binding) = ordered
            .iter()
            .copied()
            .find(|binding| self.is_usable(binding.provider(), credentials))
        {
            debug!(command = command.path(), provider = binding.provider(), "provider resolved");
            return Ok(binding);
        }

        let missing: Vec<String> = ordered
            .iter()
            .flat_map(|binding| self.missing_credentials(binding.provider(), credentials))
            .collect();
        Err(CommandError::ProviderAuth {
            command: command.path().to_owned(),
            detail: format!("no provider has credentials configured (missing: {})", missing.join(", ")),
        })
    }

    /// Providers bound to `command`.
    pub fn coverage(&self, command: &StandardCommand) -> BTreeSet<String> {
        command
            .bindings()
            .iter()
            .map(|binding| binding.provider().to_owned())
            .collect()
    }

    /// For every query field of `command`, the providers that accept it.
    pub fn field_providers(&self, command: &StandardCommand) -> BTreeMap<String, Vec<String>> {
        let mut fields: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for binding in command.bindings() {
            for field in binding.query_schema().fields() {
                fields
                    .entry(field.name.clone())
                    .or_default()
                    .push(binding.provider().to_owned());
            }
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldType;

    fn standard() -> Schema {
        Schema::new(
            "Query",
            vec![
                FieldSpec::new("symbol", FieldType::StringList).required(),
                FieldSpec::new("interval", FieldType::String).with_default("1d"),
                FieldSpec::new("limit", FieldType::Integer),
            ],
        )
        .expect("schema")
    }

    fn record() -> Schema {
        Schema::new("Data", vec![FieldSpec::new("date", FieldType::Date).required()])
            .expect("schema")
    }

    fn dummy() -> Arc<dyn ProviderAdapter> {
        crate::testing::null_adapter()
    }

    #[test]
    fn binding_merges_extras_and_removes_unsupported_fields() {
        let spec = BindingSpec::from_adapter("vendor", dummy())
            .with_query_field(FieldSpec::new("prepost", FieldType::Boolean))
            .with_record_field(FieldSpec::new("vwap", FieldType::Number))
            .unsupported("limit");

        let binding = ProviderBinding::build("/x", &standard(), &record(), spec).expect("binding");
        assert!(binding.query_schema().contains("prepost"));
        assert!(!binding.query_schema().contains("limit"));
        assert!(binding.record_schema().contains("vwap"));
        assert_eq!(
            binding.query_extras().field("prepost").map(|f| f.providers.clone()),
            Some(vec![String::from("vendor")])
        );
    }

    #[test]
    fn unsupported_required_field_is_rejected() {
        let spec = BindingSpec::from_adapter("vendor", dummy()).unsupported("symbol");
        let error = ProviderBinding::build("/x", &standard(), &record(), spec)
            .expect_err("symbol is required");
        assert!(matches!(error, LoadingError::UnresolvableBinding { .. }));
    }

    #[test]
    fn duplicate_provider_registration_fails() {
        let mut registry = ProviderRegistry::default();
        registry
            .register(ProviderInfo::new("sec", "SEC EDGAR"))
            .expect("first registration");
        let error = registry
            .register(ProviderInfo::new("sec", "again"))
            .expect_err("duplicate");
        assert!(matches!(error, LoadingError::DuplicateProvider { .. }));
    }
}
