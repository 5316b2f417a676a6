//! Explicit per-process context.

use std::sync::Arc;

use url::Url;

use crate::process::exit::{ExitHandlers, ExitReport};
use crate::process::identity::InstanceIdentity;
use crate::resources::{CloseReport, ResourceRegistry};

/// What a process unit's teardown did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub exit: ExitReport,
    pub close: CloseReport,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.exit.is_clean() && self.close.is_clean()
    }
}

/// Identity, resources and exit handlers of one process unit.
///
/// Built once when the unit starts and passed explicitly to whatever needs
/// it. Cloning shares the same underlying state.
#[derive(Debug, Clone)]
pub struct ProcessContext {
    identity: Arc<InstanceIdentity>,
    resources: Arc<ResourceRegistry>,
    exit_handlers: Arc<ExitHandlers>,
}

impl ProcessContext {
    pub fn new(canonical_url: Url) -> Self {
        Self {
            identity: Arc::new(InstanceIdentity::new(canonical_url)),
            resources: Arc::new(ResourceRegistry::new()),
            exit_handlers: Arc::new(ExitHandlers::new()),
        }
    }

    pub fn identity(&self) -> &Arc<InstanceIdentity> {
        &self.identity
    }

    pub fn resources(&self) -> &Arc<ResourceRegistry> {
        &self.resources
    }

    pub fn exit_handlers(&self) -> &Arc<ExitHandlers> {
        &self.exit_handlers
    }

    /// Run exit handlers, then close every tracked connection.
    pub async fn teardown(&self) -> TeardownReport {
        let exit = self.exit_handlers.run_all().await;
        let close = self.resources.close_all().await;
        TeardownReport { exit, close }
    }
}
