use std::sync::Arc;

use crate::adapter::{
    BoxFuture, ExtractContext, Fetcher, ProviderAdapter, QueryParams, RawPayload, TransformedData,
};
use crate::error::CommandError;
use crate::source::SourceError;

struct NullFetcher;

impl Fetcher for NullFetcher {
    type Query = ();

    fn transform_query(&self, _params: &QueryParams) -> Result<(), CommandError> {
        Ok(())
    }

    fn extract_data<'a>(
        &'a self,
        _query: &'a (),
        _ctx: &'a ExtractContext,
    ) -> BoxFuture<'a, Result<RawPayload, SourceError>> {
        Box::pin(async { Ok(RawPayload::default()) })
    }

    fn transform_data(
        &self,
        _query: &(),
        _raw: &RawPayload,
    ) -> Result<TransformedData, SourceError> {
        Ok(TransformedData::default())
    }
}

/// Adapter that performs no I/O and yields no records.
pub(crate) fn null_adapter() -> Arc<dyn ProviderAdapter> {
    Arc::new(NullFetcher)
}
