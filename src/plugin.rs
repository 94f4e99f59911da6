//! Request interception entry point.
//!
//! The host gateway builds an [`InboundRequest`] and a [`RequestContext`] for
//! each intercepted call, resolves the route's [`ApiProxy`] and hands all three
//! to a [`Plugin`]. An `Err` from `on_request` is terminal for the request.

use std::sync::Arc;

use apikey_core_types::{compute_target_path, ApiProxy, TrafficEvent, TrafficScope};
use apikey_registry::{Registry, RuleLookup};
use apikey_traffic_store::{TrafficGate, TrafficReporter};
use async_trait::async_trait;
use axum::http::{HeaderName, StatusCode};
use chrono::Utc;
use tracing::{debug, info, warn, Instrument};

use crate::config::{ApiKeySettings, SettingsError};
use crate::context::{InboundRequest, RequestContext, UNKNOWN_TAG};
use crate::errors::PluginError;
use crate::metrics;

#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;

    async fn on_request(
        &self,
        ctx: &RequestContext,
        proxy: &ApiProxy,
        request: &InboundRequest,
    ) -> Result<(), PluginError>;

    async fn on_response(
        &self,
        _ctx: &RequestContext,
        _proxy: &ApiProxy,
        _request: &InboundRequest,
        _status: StatusCode,
    ) -> Result<(), PluginError> {
        Ok(())
    }
}

/// Validates api keys against bindings and enforces their rate and quota.
pub struct ApiKeyPlugin {
    registry: Registry,
    gate: TrafficGate,
    reporter: Arc<TrafficReporter>,
    header_key: HeaderName,
}

impl ApiKeyPlugin {
    pub fn new(
        registry: Registry,
        gate: TrafficGate,
        reporter: Arc<TrafficReporter>,
        settings: &ApiKeySettings,
    ) -> Result<Self, SettingsError> {
        Ok(Self {
            registry,
            gate,
            reporter,
            header_key: settings.header_name()?,
        })
    }

    pub fn header_key(&self) -> &HeaderName {
        &self.header_key
    }

    async fn evaluate(
        &self,
        ctx: &RequestContext,
        proxy: &ApiProxy,
        request: &InboundRequest,
    ) -> Result<(), PluginError> {
        let method = request.method.as_str();

        let Some(secret) = request
            .headers
            .get(&self.header_key)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
        else {
            ctx.record_key(UNKNOWN_TAG, UNKNOWN_TAG);
            return Err(PluginError::Unauthenticated);
        };

        let Some(key) = self.registry.keys().get(secret) else {
            ctx.record_key(UNKNOWN_TAG, UNKNOWN_TAG);
            return Err(PluginError::CredentialNotFound);
        };
        ctx.record_key(&key.name, &key.namespace);

        let binding_name = proxy.binding_name().ok_or_else(|| {
            PluginError::misconfigured(format!(
                "proxy {}/{} has no apiKeyBindingName",
                proxy.namespace, proxy.name
            ))
        })?;

        let request_path = request
            .normalized_path()
            .map_err(|err| PluginError::InvalidPath {
                detail: err.to_string(),
            })?;
        let target_path =
            compute_target_path(&proxy.source_path, &proxy.target_path, &request_path);
        let resolved = match self.registry.bindings().resolve_rule(
            &proxy.namespace,
            binding_name,
            &key.name,
            &target_path,
        ) {
            RuleLookup::Resolved(resolved) => resolved,
            RuleLookup::BindingNotFound => {
                debug!(namespace = %proxy.namespace, binding = binding_name, "binding not found");
                return Err(PluginError::BindingNotFound);
            }
            RuleLookup::KeyNotGranted { binding } => {
                ctx.record_binding(&binding.name, &binding.namespace);
                debug!(key = %key.name, binding = %binding.name, "key not granted by binding");
                return Err(PluginError::KeyNotGranted);
            }
        };
        let binding = &resolved.binding;
        ctx.record_binding(&binding.name, &binding.namespace);

        let decision = apikey_authz::evaluate(resolved.rule.as_ref(), method);
        if !decision.is_allowed() {
            debug!(
                key = %key.name,
                method,
                path = %target_path,
                reason = ?decision.reason,
                "method not permitted"
            );
            return Err(PluginError::Unauthorized);
        }

        if self.gate.check_quota(binding, &key.name, ctx.deadline).await {
            return Err(PluginError::QuotaExceeded);
        }
        let now = Utc::now();
        if self
            .gate
            .check_rate(binding, &key.name, now, ctx.deadline)
            .await
        {
            return Err(PluginError::RateExceeded);
        }

        let scope = TrafficScope::for_binding(binding, &key.name);
        self.reporter.report(TrafficEvent::new(scope, now));
        Ok(())
    }
}

#[async_trait]
impl Plugin for ApiKeyPlugin {
    fn name(&self) -> &'static str {
        "api-key"
    }

    async fn on_request(
        &self,
        ctx: &RequestContext,
        proxy: &ApiProxy,
        request: &InboundRequest,
    ) -> Result<(), PluginError> {
        if apikey_authz::is_preflight(request.method.as_str()) {
            debug!(parent: ctx.span(), path = %request.path, "preflight request bypasses api key check");
            metrics::record_decision("preflight");
            return Ok(());
        }

        let result = self
            .evaluate(ctx, proxy, request)
            .instrument(ctx.span().clone())
            .await;
        match &result {
            Ok(()) => {
                metrics::record_decision("allow");
            }
            Err(err @ PluginError::Misconfigured { detail }) => {
                warn!(parent: ctx.span(), %detail, "route misconfigured; denying");
                metrics::record_decision(err.kind());
            }
            Err(err @ PluginError::InvalidPath { detail }) => {
                info!(parent: ctx.span(), %detail, "request path rejected");
                metrics::record_decision(err.kind());
            }
            Err(err) => {
                info!(parent: ctx.span(), kind = err.kind(), status = err.status().as_u16(), "request denied");
                metrics::record_decision(err.kind());
            }
        }
        result
    }
}
