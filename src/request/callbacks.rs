use std::sync::Arc;

use serde_json::Value;

use super::state::FatalError;
use crate::schema::SchemaError;
use crate::transport::TransportResponse;

pub type HookFn = Arc<dyn Fn() + Send + Sync>;
pub type ResponseFn = Arc<dyn Fn(&Value) + Send + Sync>;
pub type FailureFn = Arc<dyn Fn(&TransportResponse) + Send + Sync>;
pub type FatalFn = Arc<dyn Fn(&FatalError) + Send + Sync>;
pub type ShouldPollFn = Arc<dyn Fn(&Value) -> bool + Send + Sync>;
pub type SchemaMismatchFn = Arc<dyn Fn(&SchemaError, &Value) + Send + Sync>;
pub type ProgressCallback = Arc<dyn Fn(f64) + Send + Sync>;

#[derive(Clone, Default)]
pub(crate) struct Callbacks {
    pub pre_load: Option<HookFn>,
    pub post_load: Option<HookFn>,
    pub success: Option<ResponseFn>,
    pub poll: Option<ResponseFn>,
    pub failure: Option<FailureFn>,
    pub fatal: Option<FatalFn>,
    pub schema_mismatch: Option<SchemaMismatchFn>,
    pub progress: Option<ProgressCallback>,
}
