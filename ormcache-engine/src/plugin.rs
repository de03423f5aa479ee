//! Registers the cache engine into a hook registry.

use std::sync::Arc;

use ormcache_core::CacheResult;

use crate::hooks::{query_hook, stage_hook, Callbacks, HookPoint, Plugin};
use crate::interceptor::CacheInterceptor;

/// Plugin name, also the prefix of every handler it registers.
pub const PLUGIN_NAME: &str = "cache";

/// [`Plugin`] wiring a [`CacheInterceptor`] into all eight hook points.
///
/// Handlers are named `cache:<point>`, e.g. `cache:before_query`,
/// `cache:query`, `cache:after_delete`.
#[derive(Debug, Clone)]
pub struct CachePlugin {
    interceptor: Arc<CacheInterceptor>,
}

impl CachePlugin {
    pub fn new(interceptor: Arc<CacheInterceptor>) -> Self {
        Self { interceptor }
    }

    pub fn interceptor(&self) -> &Arc<CacheInterceptor> {
        &self.interceptor
    }

    fn handler_name(point: HookPoint) -> String {
        format!("{}:{}", PLUGIN_NAME, point)
    }
}

impl Plugin for CachePlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn initialize(&self, callbacks: &mut Callbacks) -> CacheResult<()> {
        for point in HookPoint::ALL {
            match point {
                HookPoint::BeforeQuery
                | HookPoint::BeforeCreate
                | HookPoint::BeforeUpdate
                | HookPoint::BeforeDelete => {
                    let interceptor = Arc::clone(&self.interceptor);
                    let hook = stage_hook(move |op| {
                        interceptor.before(op);
                        Box::pin(async {})
                    });
                    callbacks.register(point, Self::handler_name(point), hook)?;
                }
                HookPoint::Query => {
                    let interceptor = Arc::clone(&self.interceptor);
                    let hook = query_hook(move |op, source| {
                        let interceptor = Arc::clone(&interceptor);
                        Box::pin(async move { interceptor.query(op, source).await })
                    });
                    callbacks.replace_query(Self::handler_name(point), hook);
                }
                HookPoint::AfterCreate | HookPoint::AfterUpdate | HookPoint::AfterDelete => {
                    let interceptor = Arc::clone(&self.interceptor);
                    let hook = stage_hook(move |op| {
                        let interceptor = Arc::clone(&interceptor);
                        Box::pin(async move {
                            interceptor.after_write(op).await;
                        })
                    });
                    callbacks.register(point, Self::handler_name(point), hook)?;
                }
            }
        }

        tracing::debug!(plugin = PLUGIN_NAME, "cache hooks registered");
        Ok(())
    }
}
