use std::sync::Arc;

use provex_core::{
    builtin_catalog, builtin_commands, builtin_providers, BindingSpec, CatalogBuilder,
    CommandExecutor, CommandHandler, CommandRequest, CommandSpec, CommandTree, Credentials,
    ExecutorConfig, LoadMode, LoadingError, ProviderInfo, StubHttpClient,
};
use provex_tests::{
    constant_query_schema as query_schema, constant_record_schema as record_schema,
    constant_spec as spec, ConstantFetcher,
};
use serde_json::json;

fn builder(mode: LoadMode) -> CatalogBuilder {
    let mut builder = CatalogBuilder::new(mode);
    builder
        .provider(ProviderInfo::new("constant", "Fixed data."))
        .expect("provider registers");
    builder
}

#[test]
fn builtin_catalog_builds_a_navigable_tree() {
    let catalog = builtin_catalog(&ExecutorConfig::default()).expect("built-ins load");
    let tree = catalog.tree();

    let roots: Vec<&str> = tree
        .children(CommandTree::ROOT)
        .into_iter()
        .map(|(_, node)| node.segment())
        .collect();
    assert_eq!(roots, vec!["equity", "fixedincome", "regulators"]);

    let equity = tree.find("/equity/price").expect("interior node");
    assert!(!tree.node(equity).expect("node").is_leaf());
    let leaf = tree.find("/equity/price/historical").expect("leaf node");
    assert!(tree.node(leaf).expect("node").is_leaf());

    let under_equity: Vec<&str> = catalog
        .commands_under("/equity")
        .into_iter()
        .map(|command| command.path())
        .collect();
    assert_eq!(under_equity, vec!["/equity/price/historical"]);
    assert_eq!(catalog.commands_under("/").len(), 3);
    assert!(catalog.commands_under("/crypto").is_empty());
}

#[test]
fn coverage_reports_providers_per_command_and_commands_per_provider() {
    let catalog = builtin_catalog(&ExecutorConfig::default()).expect("built-ins load");

    let sofr = catalog
        .coverage("/fixedincome/rate/sofr")
        .expect("registered command");
    assert_eq!(
        sofr.into_iter().collect::<Vec<_>>(),
        vec![String::from("federal_reserve"), String::from("fred")]
    );
    assert!(catalog.coverage("/fixedincome/rate/estr").is_none());

    let by_provider = catalog.provider_coverage();
    assert_eq!(by_provider.len(), builtin_providers().len());
    assert_eq!(
        by_provider.get("sec"),
        Some(&vec![String::from("/regulators/sec/symbol_map")])
    );
    assert_eq!(
        by_provider.get("yfinance"),
        Some(&vec![String::from("/equity/price/historical")])
    );
}

#[test]
fn lookup_ignores_a_trailing_slash() {
    let catalog = builtin_catalog(&ExecutorConfig::default()).expect("built-ins load");
    assert!(catalog.lookup("/regulators/sec/symbol_map/").is_some());
    assert!(catalog.lookup("/regulators/sec").is_none());
}

#[test]
fn strict_mode_rejects_unknown_provider() {
    let mut builder = builder(LoadMode::Strict);
    let error = builder
        .register(spec("/test/constant", "nobody"))
        .expect_err("unknown provider");
    assert!(matches!(error, LoadingError::UnknownProvider { ref provider, .. } if provider == "nobody"));
}

#[test]
fn permissive_mode_skips_invalid_plugins_and_keeps_the_rest() {
    let mut builder = builder(LoadMode::Permissive);
    builder
        .register(spec("/test/constant", "nobody"))
        .expect("skipped, not fatal");
    builder
        .register(spec("Test/Bad Path", "constant"))
        .expect("skipped, not fatal");
    builder
        .register(spec("/test/constant", "constant"))
        .expect("valid plugin");
    builder
        .provider(ProviderInfo::new("constant", "Again."))
        .expect("skipped, not fatal");

    let catalog = builder.build();
    assert_eq!(catalog.commands().len(), 1);
    assert_eq!(catalog.skipped().len(), 3);
    assert!(matches!(catalog.skipped()[1], LoadingError::MalformedPath { .. }));
    assert!(matches!(catalog.skipped()[2], LoadingError::DuplicateProvider { .. }));
}

#[test]
fn handler_must_match_the_command_schemas() {
    let mut builder = builder(LoadMode::Strict);

    let stray_input = CommandSpec::new(
        "/test/stray",
        query_schema(),
        record_schema(),
        CommandHandler::new("constant", "ConstantData").with_inputs(["region"]),
    )
    .with_binding(BindingSpec::new("constant", ConstantFetcher));
    assert!(matches!(
        builder.register(stray_input),
        Err(LoadingError::UnknownHandlerInput { ref input, .. }) if input == "region"
    ));

    let wrong_output = CommandSpec::new(
        "/test/wrong_output",
        query_schema(),
        record_schema(),
        CommandHandler::new("constant", "SomethingElse"),
    )
    .with_binding(BindingSpec::new("constant", ConstantFetcher));
    assert!(matches!(
        builder.register(wrong_output),
        Err(LoadingError::HandlerOutputMismatch { .. })
    ));

    let reserved_input = CommandSpec::new(
        "/test/reserved",
        query_schema(),
        record_schema(),
        CommandHandler::new("constant", "ConstantData").with_inputs(["series", "provider"]),
    )
    .with_binding(BindingSpec::new("constant", ConstantFetcher));
    builder
        .register(reserved_input)
        .expect("reserved context fields are valid handler inputs");
}

#[test]
fn binding_cannot_drop_a_required_standard_field() {
    let mut builder = builder(LoadMode::Strict);
    let spec = CommandSpec::new(
        "/test/unresolvable",
        query_schema(),
        record_schema(),
        CommandHandler::new("constant", "ConstantData"),
    )
    .with_binding(BindingSpec::new("constant", ConstantFetcher).unsupported("series"));

    assert!(matches!(
        builder.register(spec),
        Err(LoadingError::UnresolvableBinding { ref field, .. }) if field == "series"
    ));
}

#[test]
fn duplicate_paths_and_empty_bindings_are_rejected() {
    let mut builder = builder(LoadMode::Strict);
    builder
        .register(spec("/test/constant", "constant"))
        .expect("first registration");
    assert!(matches!(
        builder.register(spec("/test/constant", "constant")),
        Err(LoadingError::DuplicatePath { .. })
    ));

    let unbound = CommandSpec::new(
        "/test/unbound",
        query_schema(),
        record_schema(),
        CommandHandler::new("constant", "ConstantData"),
    );
    assert!(matches!(
        builder.register(unbound),
        Err(LoadingError::NoBindings { .. })
    ));
}

#[test]
fn builtin_commands_load_alongside_a_plugin() {
    let mut builder = CatalogBuilder::new(LoadMode::Strict);
    for provider in builtin_providers() {
        builder.provider(provider).expect("built-in provider");
    }
    builder
        .provider(ProviderInfo::new("constant", "Fixed data."))
        .expect("plugin provider");
    for command in builtin_commands().expect("built-in schemas") {
        builder.register(command).expect("built-in command");
    }
    builder
        .register(spec("/test/constant", "constant"))
        .expect("plugin command");

    let catalog = builder.build();
    assert_eq!(catalog.commands().len(), 4);
    assert_eq!(
        catalog
            .tree()
            .children(CommandTree::ROOT)
            .into_iter()
            .map(|(_, node)| node.segment())
            .collect::<Vec<_>>(),
        vec!["equity", "fixedincome", "regulators", "test"]
    );
}

#[tokio::test]
async fn plugin_commands_execute_through_aliases() {
    let mut builder = builder(LoadMode::Strict);
    builder
        .register(spec("/test/constant", "constant"))
        .expect("plugin command");
    let catalog = Arc::new(builder.build());
    let http = Arc::new(StubHttpClient::new());
    let executor = CommandExecutor::new(
        catalog,
        Credentials::new(),
        http.clone(),
        ExecutorConfig::default(),
    );

    let envelope = executor
        .execute(CommandRequest::new("/test/constant").with_argument("series", "demo"))
        .await;

    assert!(envelope.is_success(), "{:?}", envelope.error());
    assert_eq!(envelope.provider(), Some("constant"));
    assert_eq!(envelope.results()[0]["date"], json!("2024-01-02"));
    assert_eq!(envelope.results()[0]["value"], json!(1.5));
    assert_eq!(envelope.results()[1]["series"], json!("demo"));
    assert_eq!(http.total_calls(), 0);
}
