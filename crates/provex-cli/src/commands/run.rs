use std::sync::Arc;
use std::time::Duration;

use provex_core::{CacheMode, CommandExecutor, CommandRequest, Params, ReqwestHttpClient};
use serde_json::Value;

use crate::cli::RunArgs;
use crate::error::CliError;

use super::{Context, Outcome};

pub async fn run(args: &RunArgs, context: &Context) -> Result<Outcome, CliError> {
    let mut request = CommandRequest::new(args.path.as_str())
        .with_arguments(arguments(&args.arguments));
    if let Some(provider) = &args.provider {
        request = request.with_provider(provider.as_str());
    }
    if let Some(timeout_ms) = args.timeout_ms {
        if timeout_ms == 0 {
            return Err(CliError::InvalidArgument(String::from(
                "--timeout-ms must be greater than zero",
            )));
        }
        request = request.with_timeout(Duration::from_millis(timeout_ms));
    }
    if args.no_cache {
        request = request.with_cache_mode(CacheMode::Bypass);
    }

    let executor = CommandExecutor::new(
        Arc::clone(&context.catalog),
        context.credentials.clone(),
        Arc::new(ReqwestHttpClient::new()),
        context.config.clone(),
    );
    Ok(Outcome::Envelope(executor.execute(request).await))
}

/// `--arg` values that parse as JSON keep their type; everything else is a
/// plain string. Repeated keys keep the last value.
fn arguments(pairs: &[(String, String)]) -> Params {
    pairs
        .iter()
        .map(|(key, raw)| {
            let value = serde_json::from_str::<Value>(raw)
                .unwrap_or_else(|_| Value::String(raw.clone()));
            (key.clone(), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn pair(key: &str, value: &str) -> (String, String) {
        (key.to_owned(), value.to_owned())
    }

    #[test]
    fn json_literals_keep_their_type() {
        let params = arguments(&[
            pair("use_cache", "false"),
            pair("limit", "5"),
            pair("symbol", "[\"AAPL\",\"MSFT\"]"),
        ]);
        assert_eq!(params.get("use_cache"), Some(&json!(false)));
        assert_eq!(params.get("limit"), Some(&json!(5)));
        assert_eq!(params.get("symbol"), Some(&json!(["AAPL", "MSFT"])));
    }

    #[test]
    fn bare_words_and_dates_stay_strings() {
        let params = arguments(&[
            pair("query", "0000789019"),
            pair("start_date", "2023-01-01"),
            pair("symbol", "AAPL,MSFT"),
        ]);
        assert_eq!(params.get("start_date"), Some(&json!("2023-01-01")));
        assert_eq!(params.get("symbol"), Some(&json!("AAPL,MSFT")));
    }
}
