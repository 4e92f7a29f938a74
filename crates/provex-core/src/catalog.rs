//! Command catalog: registration, validation at startup and lookup.
//!
//! Plugins describe commands with a [`CommandSpec`]. [`CatalogBuilder`]
//! checks each spec and turns it into a [`StandardCommand`]. `build()` then
//! freezes everything into an immutable [`Catalog`] that the executor shares
//! across calls. Registration errors are fatal in [`LoadMode::Strict`] and
//! skipped with a warning in [`LoadMode::Permissive`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use tracing::{info, warn};

use crate::adapter::QueryParams;
use crate::config::LoadMode;
use crate::error::LoadingError;
use crate::registry::{BindingSpec, ProviderBinding, ProviderInfo, ProviderRegistry};
use crate::schema::{Record, Schema};
use crate::tree::CommandTree;

/// Argument names handled by the executor itself and never passed to providers.
pub const RESERVED_CONTEXT_FIELDS: [&str; 3] = ["provider", "timeout_ms", "cache"];

pub type PostProcess = Arc<dyn Fn(&QueryParams, Vec<Record>) -> Vec<Record> + Send + Sync>;

/// Entry point metadata for a command, with an optional record post-processor.
#[derive(Clone)]
pub struct CommandHandler {
    name: String,
    inputs: Vec<String>,
    output: String,
    post_process: Option<PostProcess>,
}

impl CommandHandler {
    /// `output` must name the command's record schema.
    pub fn new(name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            output: output.into(),
            post_process: None,
        }
    }

    pub fn with_inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs = inputs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_post_process<F>(mut self, post_process: F) -> Self
    where
        F: Fn(&QueryParams, Vec<Record>) -> Vec<Record> + Send + Sync + 'static,
    {
        self.post_process = Some(Arc::new(post_process));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub(crate) fn apply(&self, params: &QueryParams, records: Vec<Record>) -> Vec<Record> {
        match &self.post_process {
            Some(post_process) => post_process(params, records),
            None => records,
        }
    }
}

impl Debug for CommandHandler {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandHandler")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .field("output", &self.output)
            .field("post_process", &self.post_process.is_some())
            .finish()
    }
}

/// Plugin registration contract for one command.
#[derive(Debug)]
pub struct CommandSpec {
    path: String,
    description: String,
    query_schema: Schema,
    record_schema: Schema,
    handler: CommandHandler,
    bindings: Vec<BindingSpec>,
}

impl CommandSpec {
    pub fn new(
        path: impl Into<String>,
        query_schema: Schema,
        record_schema: Schema,
        handler: CommandHandler,
    ) -> Self {
        Self {
            path: path.into(),
            description: String::new(),
            query_schema,
            record_schema,
            handler,
            bindings: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_binding(mut self, binding: BindingSpec) -> Self {
        self.bindings.push(binding);
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// A registered command with its bound providers.
#[derive(Debug)]
pub struct StandardCommand {
    path: String,
    description: String,
    query_schema: Schema,
    record_schema: Schema,
    combined_query: Schema,
    handler: CommandHandler,
    bindings: Vec<ProviderBinding>,
}

impl StandardCommand {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Standard query fields shared by every provider.
    pub fn query_schema(&self) -> &Schema {
        &self.query_schema
    }

    pub fn record_schema(&self) -> &Schema {
        &self.record_schema
    }

    /// Standard fields merged with every provider's extras, for documentation.
    pub fn combined_query_schema(&self) -> &Schema {
        &self.combined_query
    }

    pub fn handler(&self) -> &CommandHandler {
        &self.handler
    }

    /// Bindings in declaration order.
    pub fn bindings(&self) -> &[ProviderBinding] {
        &self.bindings
    }

    pub fn binding(&self, provider: &str) -> Option<&ProviderBinding> {
        self.bindings
            .iter()
            .find(|binding| binding.provider() == provider)
    }

    pub fn providers(&self) -> Vec<&str> {
        self.bindings.iter().map(ProviderBinding::provider).collect()
    }
}

fn validate_path(path: &str) -> Result<(), &'static str> {
    let Some(rest) = path.strip_prefix('/') else {
        return Err("must start with '/'");
    };
    if rest.is_empty() {
        return Err("must name at least one segment");
    }
    for segment in rest.split('/') {
        if segment.is_empty() {
            return Err("contains an empty segment");
        }
        let valid = segment
            .chars()
            .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_');
        if !valid {
            return Err("segments may only contain lowercase letters, digits and '_'");
        }
    }
    Ok(())
}

/// Collects providers and commands, then freezes them into a [`Catalog`].
#[derive(Debug)]
pub struct CatalogBuilder {
    mode: LoadMode,
    registry: ProviderRegistry,
    commands: Vec<StandardCommand>,
    skipped: Vec<LoadingError>,
}

impl CatalogBuilder {
    pub fn new(mode: LoadMode) -> Self {
        Self {
            mode,
            registry: ProviderRegistry::default(),
            commands: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Preference order used when a call does not name a provider.
    pub fn with_priorities(mut self, priorities: HashMap<String, i32>) -> Self {
        self.registry.set_priorities(priorities);
        self
    }

    fn reject(&mut self, error: LoadingError) -> Result<(), LoadingError> {
        match self.mode {
            LoadMode::Strict => Err(error),
            LoadMode::Permissive => {
                warn!(error = %error, "skipping invalid plugin registration");
                self.skipped.push(error);
                Ok(())
            }
        }
    }

    pub fn provider(&mut self, info: ProviderInfo) -> Result<(), LoadingError> {
        match self.registry.register(info) {
            Ok(()) => Ok(()),
            Err(error) => self.reject(error),
        }
    }

    /// Validate and add one command.
    pub fn register(&mut self, spec: CommandSpec) -> Result<(), LoadingError> {
        match self.check(spec) {
            Ok(command) => {
                info!(
                    path = command.path(),
                    providers = ?command.providers(),
                    "command registered"
                );
                self.commands.push(command);
                Ok(())
            }
            Err(error) => self.reject(error),
        }
    }

    fn check(&self, spec: CommandSpec) -> Result<StandardCommand, LoadingError> {
        let CommandSpec {
            path,
            description,
            query_schema,
            record_schema,
            handler,
            bindings,
        } = spec;

        validate_path(&path).map_err(|reason| LoadingError::MalformedPath {
            path: path.clone(),
            reason,
        })?;
        if self.commands.iter().any(|command| command.path == path) {
            return Err(LoadingError::DuplicatePath { path });
        }
        if bindings.is_empty() {
            return Err(LoadingError::NoBindings { path });
        }

        for input in handler.inputs() {
            let known = query_schema.contains(input)
                || RESERVED_CONTEXT_FIELDS.contains(&input.as_str());
            if !known {
                return Err(LoadingError::UnknownHandlerInput {
                    path,
                    handler: handler.name().to_owned(),
                    input: input.clone(),
                });
            }
        }
        if handler.output() != record_schema.name() {
            return Err(LoadingError::HandlerOutputMismatch {
                path,
                handler: handler.name().to_owned(),
                declared: handler.output().to_owned(),
                expected: record_schema.name().to_owned(),
            });
        }

        let mut seen = BTreeSet::new();
        let mut built = Vec::with_capacity(bindings.len());
        for binding in bindings {
            let provider = binding.provider().to_owned();
            if self.registry.get(&provider).is_none() {
                return Err(LoadingError::UnknownProvider { path, provider });
            }
            if !seen.insert(provider.clone()) {
                return Err(LoadingError::DuplicateBinding { path, provider });
            }
            built.push(ProviderBinding::build(
                &path,
                &query_schema,
                &record_schema,
                binding,
            )?);
        }

        let mut combined_query = query_schema.clone();
        for binding in &built {
            combined_query = Schema::merge(&combined_query, binding.query_extras())?;
        }

        Ok(StandardCommand {
            path,
            description,
            query_schema,
            record_schema,
            combined_query,
            handler,
            bindings: built,
        })
    }

    pub fn build(self) -> Catalog {
        let mut tree = CommandTree::default();
        let mut index = HashMap::with_capacity(self.commands.len());
        for (position, command) in self.commands.iter().enumerate() {
            tree.insert(command.path(), position);
            index.insert(command.path.clone(), position);
        }
        Catalog {
            commands: self.commands,
            index,
            tree,
            registry: self.registry,
            skipped: self.skipped,
        }
    }
}

/// Immutable command catalog shared by every executor call.
#[derive(Debug)]
pub struct Catalog {
    commands: Vec<StandardCommand>,
    index: HashMap<String, usize>,
    tree: CommandTree,
    registry: ProviderRegistry,
    skipped: Vec<LoadingError>,
}

impl Catalog {
    /// Exact path lookup. A trailing `/` is ignored.
    pub fn lookup(&self, path: &str) -> Option<&StandardCommand> {
        let trimmed = if path.len() > 1 {
            path.trim_end_matches('/')
        } else {
            path
        };
        self.index
            .get(trimmed)
            .and_then(|position| self.commands.get(*position))
    }

    pub fn commands(&self) -> &[StandardCommand] {
        &self.commands
    }

    pub fn tree(&self) -> &CommandTree {
        &self.tree
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn providers(&self) -> &[ProviderInfo] {
        self.registry.providers()
    }

    /// Registrations rejected in permissive mode.
    pub fn skipped(&self) -> &[LoadingError] {
        &self.skipped
    }

    /// Commands at or below `prefix`, in path order.
    pub fn commands_under(&self, prefix: &str) -> Vec<&StandardCommand> {
        self.tree
            .find(prefix)
            .map(|node| {
                self.tree
                    .commands_under(node)
                    .into_iter()
                    .filter_map(|position| self.commands.get(position))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Providers bound to the command at `path`.
    pub fn coverage(&self, path: &str) -> Option<BTreeSet<String>> {
        self.lookup(path)
            .map(|command| self.registry.coverage(command))
    }

    /// For every provider, the command paths it serves.
    pub fn provider_coverage(&self) -> BTreeMap<String, Vec<String>> {
        let mut coverage: BTreeMap<String, Vec<String>> = self
            .registry
            .providers()
            .iter()
            .map(|info| (info.name.clone(), Vec::new()))
            .collect();
        for command in &self.commands {
            for provider in command.providers() {
                coverage
                    .entry(provider.to_owned())
                    .or_default()
                    .push(command.path().to_owned());
            }
        }
        coverage
    }
}
