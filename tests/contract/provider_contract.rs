use std::sync::Arc;

use provex_core::{
    builtin_catalog, Credentials, ExecutorConfig, ExtractContext, Params, ProviderBinding,
    QueryParams, RawPayload, RetryConfig, StandardCommand, StubHttpClient,
};
use serde_json::{json, Value};

/// Every built-in binding and the vendor body it is exercised against.
struct ContractCase {
    path: &'static str,
    provider: &'static str,
    arguments: Value,
    payload: fn() -> RawPayload,
}

fn cases() -> Vec<ContractCase> {
    vec![
        ContractCase {
            path: "/fixedincome/rate/sofr",
            provider: "fred",
            arguments: json!({"start_date": "2023-06-01", "end_date": "2023-06-06"}),
            payload: || {
                RawPayload::single(
                    r#"{"observations":[{"date":"2023-06-05","value":"5.07"},
                        {"date":"2023-06-06","value":"5.06"}]}"#,
                )
            },
        },
        ContractCase {
            path: "/fixedincome/rate/sofr",
            provider: "federal_reserve",
            arguments: json!({"start_date": "2023-06-01", "end_date": "2023-06-06"}),
            payload: || {
                RawPayload::single(
                    r#"{"refRates":[{"effectiveDate":"2023-06-06","percentRate":5.06,
                        "percentPercentile1":5.01,"percentPercentile25":5.03,
                        "percentPercentile75":5.1,"percentPercentile99":5.15,
                        "volumeInBillions":1488}]}"#,
                )
            },
        },
        ContractCase {
            path: "/regulators/sec/symbol_map",
            provider: "sec",
            arguments: json!({"query": "320193"}),
            payload: || {
                RawPayload::single(r#"{"cik":"320193","name":"Apple Inc.","tickers":["AAPL"]}"#)
            },
        },
        ContractCase {
            path: "/equity/price/historical",
            provider: "fmp",
            arguments: json!({"symbol": "AAPL", "start_date": "2024-01-02", "end_date": "2024-01-02"}),
            payload: || {
                let mut raw = RawPayload::default();
                raw.push(
                    "AAPL",
                    r#"{"symbol":"AAPL","historical":[{"date":"2024-01-02","open":187.15,
                        "high":188.44,"low":183.89,"close":185.64,"volume":82488700,
                        "vwap":185.99,"changePercent":-0.81}]}"#,
                );
                raw
            },
        },
        ContractCase {
            path: "/equity/price/historical",
            provider: "yfinance",
            arguments: json!({"symbol": "AAPL", "start_date": "2024-01-02", "end_date": "2024-01-02"}),
            payload: || {
                let mut raw = RawPayload::default();
                raw.push(
                    "AAPL",
                    r#"{"chart":{"result":[{"timestamp":[1704205800],
                        "indicators":{"quote":[{"open":[187.15],"high":[188.44],"low":[183.89],
                        "close":[185.64],"volume":[82488700]}]}}],"error":null}}"#,
                );
                raw
            },
        },
    ]
}

fn binding<'c>(command: &'c StandardCommand, provider: &str) -> &'c ProviderBinding {
    command
        .binding(provider)
        .unwrap_or_else(|| panic!("'{provider}' is not bound to '{}'", command.path()))
}

/// Validate `arguments` the way the executor does and split off extras.
fn query_params(command: &StandardCommand, binding: &ProviderBinding, arguments: &Value) -> QueryParams {
    let raw: Params = arguments.as_object().cloned().unwrap_or_default();
    let validated = binding
        .query_schema()
        .validate(&raw)
        .unwrap_or_else(|error| panic!("'{}' rejected sample arguments: {error}", binding.provider()));
    let (standard, extra): (Params, Params) = validated
        .into_iter()
        .partition(|(key, _)| command.query_schema().contains(key));
    QueryParams::new(command.path(), standard, extra)
}

#[test]
fn every_builtin_binding_has_a_contract_case() {
    let catalog = builtin_catalog(&ExecutorConfig::default()).expect("built-ins load");
    let covered: Vec<(&str, &str)> = cases().iter().map(|case| (case.path, case.provider)).collect();

    for command in catalog.commands() {
        for provider in command.providers() {
            assert!(
                covered.contains(&(command.path(), provider)),
                "no contract case for '{provider}' on '{}'",
                command.path()
            );
        }
    }
}

#[test]
fn query_transform_is_deterministic() {
    let catalog = builtin_catalog(&ExecutorConfig::default()).expect("built-ins load");

    for case in cases() {
        let command = catalog.lookup(case.path).expect("registered command");
        let binding = binding(command, case.provider);
        let params = query_params(command, binding, &case.arguments);

        let first = binding
            .adapter()
            .transform_query(&params)
            .unwrap_or_else(|error| panic!("'{}' transform_query failed: {error}", case.provider));
        let second = binding
            .adapter()
            .transform_query(&params)
            .expect("second transform");
        assert!(!first.fingerprint().is_empty(), "'{}': fingerprint", case.provider);
        assert_eq!(first.fingerprint(), second.fingerprint(), "'{}'", case.provider);
    }
}

#[test]
fn transformed_records_normalize_against_the_record_schema() {
    let catalog = builtin_catalog(&ExecutorConfig::default()).expect("built-ins load");

    for case in cases() {
        let command = catalog.lookup(case.path).expect("registered command");
        let binding = binding(command, case.provider);
        let params = query_params(command, binding, &case.arguments);
        let request = binding
            .adapter()
            .transform_query(&params)
            .expect("valid query");

        let data = binding
            .adapter()
            .transform_data(&request, &(case.payload)())
            .unwrap_or_else(|error| panic!("'{}' transform_data failed: {error}", case.provider));
        assert!(!data.records.is_empty(), "'{}': no records", case.provider);

        for record in &data.records {
            let normalized = binding
                .record_schema()
                .normalize_record(record)
                .unwrap_or_else(|error| panic!("'{}' record rejected: {error}", case.provider));
            assert!(
                normalized.nulled.is_empty(),
                "'{}' nulled {:?}",
                case.provider,
                normalized.nulled
            );
            for field in command.record_schema().fields() {
                assert!(
                    normalized.record.contains_key(&field.name),
                    "'{}' record lacks '{}'",
                    case.provider,
                    field.name
                );
            }
        }
    }
}

#[test]
fn policies_allow_at_least_one_request_in_flight() {
    let catalog = builtin_catalog(&ExecutorConfig::default()).expect("built-ins load");
    for command in catalog.commands() {
        for binding in command.bindings() {
            assert!(binding.policy().max_concurrency >= 1, "'{}'", binding.provider());
        }
    }
}

#[tokio::test]
async fn api_keys_travel_in_the_query_and_stay_out_of_logs() {
    let catalog = builtin_catalog(&ExecutorConfig::default()).expect("built-ins load");
    let command = catalog
        .lookup("/fixedincome/rate/sofr")
        .expect("registered command");
    let binding = binding(command, "fred");
    let params = query_params(
        command,
        binding,
        &json!({"start_date": "2023-06-01", "end_date": "2023-06-06"}),
    );
    let request = binding
        .adapter()
        .transform_query(&params)
        .expect("valid query");
    assert!(!request.fingerprint().contains("fred-secret"));

    let http = Arc::new(
        StubHttpClient::new().route_json("api.stlouisfed.org", r#"{"observations":[]}"#),
    );
    let credentials = Credentials::new()
        .with("fred", "api_key", "fred-secret")
        .provider("fred")
        .cloned()
        .unwrap_or_default();
    let context = ExtractContext::new("fred", http.clone())
        .with_credentials(credentials)
        .with_retry(RetryConfig::no_retry());

    let raw = binding
        .adapter()
        .extract_data(&request, &context)
        .await
        .expect("stubbed fetch");
    assert_eq!(raw.parts.len(), 1);
    assert_eq!(context.attempts(), 1);

    let sent = http.requests();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].url.contains("api_key=fred-secret"));
    assert!(sent[0].url.contains("series_id=SOFR"));
    assert!(!sent[0].redacted_url().contains("fred-secret"));
}

#[tokio::test]
async fn missing_credentials_fail_before_any_request() {
    let catalog = builtin_catalog(&ExecutorConfig::default()).expect("built-ins load");
    let command = catalog
        .lookup("/equity/price/historical")
        .expect("registered command");
    let binding = binding(command, "fmp");
    let params = query_params(command, binding, &json!({"symbol": "AAPL"}));
    let request = binding
        .adapter()
        .transform_query(&params)
        .expect("valid query");

    let http = Arc::new(StubHttpClient::new());
    let context = ExtractContext::new("fmp", http.clone()).with_retry(RetryConfig::no_retry());
    let error = binding
        .adapter()
        .extract_data(&request, &context)
        .await
        .expect_err("no api key configured");

    assert!(error.message().contains("api_key"), "{error}");
    assert_eq!(http.total_calls(), 0);
}
