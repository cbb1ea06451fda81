/*!
 * Switch router
 *
 * Entry point for one invocation: validates the request, compiles its cases,
 * opens the source and drives a [`Pipeline`] to completion.
 */

use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

use crate::backend::BackendRegistry;
use crate::config::RouterConfig;
use crate::core::{
    open_source, Case, DurableTarget, ExpressionEngine, Pipeline, Predicate, PredicateRegistry,
    RunOutcome, SinkMode,
};
use crate::error::{Result, SwitchError};
use crate::request::{CaseConfig, SwitchRequest, SwitchResponse};

/// Routes records from one input to N cases
#[derive(Debug, Clone)]
pub struct SwitchRouter {
    config: RouterConfig,
    backends: BackendRegistry,
    predicates: PredicateRegistry,
    engine: ExpressionEngine,
}

impl SwitchRouter {
    /// Router with the built-in `file` and `memory` backends
    pub fn new(config: RouterConfig) -> Self {
        Self {
            config,
            backends: BackendRegistry::new(),
            predicates: PredicateRegistry::new(),
            engine: ExpressionEngine::new(),
        }
    }

    /// Router with every backend the configuration describes
    pub async fn from_config(config: RouterConfig) -> Result<Self> {
        config.validate()?;
        let backends = BackendRegistry::from_config(&config).await?;
        Ok(Self::new(config).with_backends(backends))
    }

    /// Builder pattern: replace the backend registry
    pub fn with_backends(mut self, backends: BackendRegistry) -> Self {
        self.backends = backends;
        self
    }

    /// Builder pattern: replace the predicate registry
    pub fn with_predicates(mut self, predicates: PredicateRegistry) -> Self {
        self.predicates = predicates;
        self
    }

    /// Register a named predicate for cases to refer to
    pub fn register_predicate(&mut self, name: impl Into<String>, predicate: Arc<dyn Predicate>) {
        self.predicates.register(name, predicate);
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn backends(&self) -> &BackendRegistry {
        &self.backends
    }

    /// Run one request and return per-case outputs plus statistics
    pub async fn route(&self, request: SwitchRequest) -> Result<RunOutcome> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("route", %run_id, cases = request.cases.len());
        self.route_inner(request).instrument(span).await
    }

    /// Run one request and return the response document
    pub async fn handle(&self, request: SwitchRequest) -> Result<SwitchResponse> {
        Ok(self.route(request).await?.into_response())
    }

    async fn route_inner(&self, request: SwitchRequest) -> Result<RunOutcome> {
        let input = request
            .input
            .as_ref()
            .filter(|input| !input.is_blank())
            .ok_or_else(|| SwitchError::Config("\"input\" argument is required".to_string()))?;

        let sinks = self.sink_mode(&request)?;
        let cases = self.compile_cases(&request.cases)?;

        if cases.is_empty() {
            tracing::info!("No cases given, nothing to route");
            return Ok(RunOutcome::default());
        }

        tracing::info!("Routing input to {} cases ({:?})", cases.len(), sinks);

        let source = open_source(input, &self.backends).await?;
        let mut pipeline = Pipeline::new(cases, sinks)
            .with_channel_capacity(self.config.channel_capacity)
            .with_durability_timeout(self.config.durability_timeout());
        pipeline.run(source).await
    }

    fn sink_mode(&self, request: &SwitchRequest) -> Result<SinkMode> {
        let Some(destination) = &request.durable_destination else {
            return Ok(SinkMode::Memory);
        };
        let destination = destination.validate()?;

        let scheme = self.config.destination_backend.scheme();
        let store = self.backends.get(scheme).map_err(|e| {
            SwitchError::Config(format!("Destination backend unavailable: {}", e))
        })?;

        let target = DurableTarget::new(store, destination);
        target
            .check()
            .map_err(|e| SwitchError::Config(format!("Invalid destination: {}", e)))?;
        Ok(SinkMode::Durable(target))
    }

    fn compile_cases(&self, configs: &[CaseConfig]) -> Result<Vec<Case>> {
        configs
            .iter()
            .enumerate()
            .map(|(index, config)| self.compile_case(index, config))
            .collect()
    }

    fn compile_case(&self, index: usize, config: &CaseConfig) -> Result<Case> {
        let predicate: Option<Arc<dyn Predicate>> = match (&config.expression, &config.predicate) {
            (Some(_), Some(_)) => {
                return Err(SwitchError::Config(format!(
                    "case {}: \"expression\" and \"predicate\" are mutually exclusive",
                    index
                )))
            }
            (Some(source), None) => Some(Arc::new(self.engine.compile(source)?) as Arc<dyn Predicate>),
            (None, Some(name)) => Some(self.predicates.get(name).ok_or_else(|| {
                SwitchError::Config(format!("case {}: unknown predicate '{}'", index, name))
            })?),
            (None, None) => None,
        };

        let case = match (config.always_run, config.default) {
            (true, _) => Case::always_run(),
            (false, true) => Case::default_case(),
            (false, false) => Case::accept_all(),
        };

        Ok(match predicate {
            Some(predicate) => case.with_predicate(predicate),
            None => case,
        })
    }
}
