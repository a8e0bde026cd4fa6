//! Builders to construct repeater services from configuration.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::config::{RepeaterConfig, ServiceConfig, WaitpointConfig};
use crate::core::{
    CloseableWaitpoint, ExceptionHandler, RepeaterService, SyncError, ThrottlingWaitpoint,
    Waitpoint,
};

/// Typed handle to the gate of a built repeater, for opening, closing or
/// re-rating it at runtime.
#[derive(Debug, Clone)]
pub enum GateHandle {
    /// Open/closed gate.
    Closeable(Arc<CloseableWaitpoint>),
    /// Token-bucket throttle.
    Throttling(Arc<ThrottlingWaitpoint>),
}

impl GateHandle {
    /// The gate as a plain waitpoint.
    #[must_use]
    pub fn as_waitpoint(&self) -> Arc<dyn Waitpoint> {
        match self {
            Self::Closeable(gate) => Arc::clone(gate) as Arc<dyn Waitpoint>,
            Self::Throttling(gate) => Arc::clone(gate) as Arc<dyn Waitpoint>,
        }
    }
}

/// A repeater built from configuration, with its gate if one was configured.
#[derive(Debug)]
pub struct BuiltRepeater {
    /// The unstarted service.
    pub service: RepeaterService,
    /// Handle to the configured gate.
    pub gate: Option<GateHandle>,
}

/// Build the gate described by `cfg`, if any.
pub fn build_waitpoint(cfg: &WaitpointConfig) -> Result<Option<GateHandle>, SyncError> {
    cfg.validate().map_err(SyncError::IllegalArgument)?;
    Ok(match *cfg {
        WaitpointConfig::None => None,
        WaitpointConfig::Closeable { open } => {
            Some(GateHandle::Closeable(Arc::new(CloseableWaitpoint::new(open))))
        }
        WaitpointConfig::Throttling {
            permits_per_second,
            burst,
        } => Some(GateHandle::Throttling(Arc::new(ThrottlingWaitpoint::new(
            permits_per_second,
            burst,
        )?))),
    })
}

/// Build one unstarted repeater.
pub fn build_repeater(
    cfg: &RepeaterConfig,
    handler: Arc<dyn ExceptionHandler>,
) -> Result<BuiltRepeater, SyncError> {
    cfg.validate()
        .map_err(|e| SyncError::IllegalArgument(format!("config invalid: {e}")))?;

    let gate = build_waitpoint(&cfg.waitpoint)?;
    let service = match &gate {
        Some(gate) => RepeaterService::with_waitpoint(
            cfg.pool.clone(),
            cfg.lending_mode,
            gate.as_waitpoint(),
            handler,
        )?,
        None => RepeaterService::new(cfg.pool.clone(), cfg.lending_mode, handler)?,
    };
    Ok(BuiltRepeater { service, gate })
}

/// Build every repeater in `cfg`, naming each pool after its map key.
pub fn build_repeaters<FH>(
    cfg: &ServiceConfig,
    mut handler_factory: FH,
) -> Result<HashMap<String, BuiltRepeater>, SyncError>
where
    FH: FnMut(&str, &RepeaterConfig) -> Arc<dyn ExceptionHandler>,
{
    cfg.validate()
        .map_err(|e| SyncError::IllegalArgument(format!("config invalid: {e}")))?;

    let mut repeaters = HashMap::new();
    for (name, repeater_cfg) in &cfg.repeaters {
        let named = repeater_cfg
            .clone()
            .with_pool(repeater_cfg.pool.clone().with_name(name.clone()));
        let handler = handler_factory(name, repeater_cfg);
        let built = build_repeater(&named, handler)?;
        info!(
            repeater = %name,
            pool_size = named.pool.pool_size,
            mode = ?named.lending_mode,
            gated = built.gate.is_some(),
            "repeater built"
        );
        repeaters.insert(name.clone(), built);
    }

    Ok(repeaters)
}
