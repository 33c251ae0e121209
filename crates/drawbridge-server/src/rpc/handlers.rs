//! Method handlers: one per editor command plus bridge introspection.

use async_trait::async_trait;
use drawbridge_core::EditorCommand;
use serde_json::{json, Value};
use tracing::instrument;

use crate::rpc::context::RpcContext;
use crate::rpc::errors::RpcError;
use crate::rpc::registry::{MethodHandler, MethodRegistry};

/// Reports connected transports and bus counters.
pub const STATUS_METHOD: &str = "bridge.status";
/// Lists the editor command catalogue.
pub const COMMANDS_METHOD: &str = "bridge.commands";

/// Forwards one editor command and waits for the editor's reply.
pub struct EditorCommandHandler {
    name: &'static str,
}

impl EditorCommandHandler {
    /// Handler for catalogue entry `name`.
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

#[async_trait]
impl MethodHandler for EditorCommandHandler {
    #[instrument(skip_all, fields(method))]
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let _ = tracing::Span::current().record("method", self.name);
        let command = EditorCommand::parse(self.name, params.unwrap_or(Value::Null))?;
        Ok(ctx.bridge.bus().execute(&command).await?)
    }
}

/// `bridge.status`
pub struct StatusHandler;

#[async_trait]
impl MethodHandler for StatusHandler {
    async fn handle(&self, _params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        Ok(json!({
            "uptime_secs": ctx.start_time.elapsed().as_secs(),
            "transports": ctx.bridge.registry().describe(),
            "bus": ctx.bridge.bus().stats(),
        }))
    }
}

/// `bridge.commands`
pub struct CommandsHandler;

#[async_trait]
impl MethodHandler for CommandsHandler {
    async fn handle(&self, _params: Option<Value>, _ctx: &RpcContext) -> Result<Value, RpcError> {
        Ok(json!({ "commands": EditorCommand::NAMES }))
    }
}

/// Register every editor command and the introspection methods.
pub fn register_all(registry: &mut MethodRegistry) {
    for name in EditorCommand::NAMES {
        registry.register(name, EditorCommandHandler::new(name));
    }
    registry.register(STATUS_METHOD, StatusHandler);
    registry.register(COMMANDS_METHOD, CommandsHandler);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use drawbridge_bus::{Bridge, BusConfig, TransportKind};
    use tokio_util::sync::CancellationToken;

    use crate::rpc::errors;
    use crate::rpc::types::RpcRequest;

    fn bridge(timeout: Duration) -> Arc<Bridge> {
        Arc::new(Bridge::new(&BusConfig {
            request_timeout: timeout,
            ..BusConfig::default()
        }))
    }

    fn registry() -> MethodRegistry {
        let mut reg = MethodRegistry::new();
        register_all(&mut reg);
        reg
    }

    fn call(method: &str, params: Value) -> RpcRequest {
        RpcRequest {
            id: "c1".into(),
            method: method.into(),
            params: Some(params),
        }
    }

    #[test]
    fn registers_whole_catalogue() {
        let reg = registry();
        for name in EditorCommand::NAMES {
            assert!(reg.has_method(name), "{name} missing");
        }
        assert!(reg.has_method(STATUS_METHOD));
        assert!(reg.has_method(COMMANDS_METHOD));
        assert_eq!(reg.methods().len(), EditorCommand::NAMES.len() + 2);
    }

    #[tokio::test]
    async fn editor_reply_becomes_result() {
        let bridge = bridge(Duration::from_secs(5));
        let cancel = CancellationToken::new();
        let _tasks = bridge.spawn(&cancel);
        let (_handle, mut rx) = bridge.on_transport_connected(TransportKind::WebSocket);

        let editor = {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move {
                let raw = rx.recv().await.unwrap();
                let cmd: Value = serde_json::from_str(&raw).unwrap();
                assert_eq!(cmd["name"], "add-rectangle");
                assert_eq!(cmd["payload"]["width"], 200.0);
                let reply = json!({"id": cmd["id"], "payload": {"cellId": "abc123"}});
                bridge.on_transport_message(None, reply.to_string());
            })
        };

        let ctx = RpcContext::new(Arc::clone(&bridge));
        let resp = registry()
            .dispatch(
                call("add-rectangle", json!({"x": 100, "y": 100, "width": 200, "height": 100})),
                &ctx,
            )
            .await;
        editor.await.unwrap();
        cancel.cancel();

        assert!(resp.success, "{resp:?}");
        assert_eq!(resp.result.unwrap(), json!({"cellId": "abc123"}));
    }

    #[tokio::test]
    async fn invalid_params_never_reach_the_editor() {
        let bridge = bridge(Duration::from_secs(5));
        let (_handle, mut rx) = bridge.on_transport_connected(TransportKind::EventStream);
        let ctx = RpcContext::new(Arc::clone(&bridge));

        let resp = registry()
            .dispatch(call("add-rectangle", json!({"x": 0, "y": 0, "width": -1, "height": 5})), &ctx)
            .await;

        assert_eq!(resp.error.unwrap().code, errors::INVALID_PARAMS);
        assert!(rx.try_recv().is_err());
        assert_eq!(bridge.bus().pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_editor_times_out() {
        let bridge = bridge(Duration::from_millis(500));
        let cancel = CancellationToken::new();
        let _tasks = bridge.spawn(&cancel);
        let ctx = RpcContext::new(Arc::clone(&bridge));

        let resp = registry().dispatch(call("get-selected-cell", Value::Null), &ctx).await;
        cancel.cancel();

        let err = resp.error.unwrap();
        assert_eq!(err.code, errors::TIMEOUT);
        assert_eq!(err.details.unwrap()["timeoutMs"], 500);
    }

    #[tokio::test]
    async fn status_and_catalogue() {
        let bridge = bridge(Duration::from_secs(1));
        let (_handle, _rx) = bridge.on_transport_connected(TransportKind::WebSocket);
        let ctx = RpcContext::new(bridge);
        let reg = registry();

        let status = reg.dispatch(call(STATUS_METHOD, Value::Null), &ctx).await.result.unwrap();
        assert_eq!(status["transports"].as_array().unwrap().len(), 1);
        assert_eq!(status["transports"][0]["kind"], "web-socket");
        assert_eq!(status["bus"]["pending"], 0);

        let cmds = reg.dispatch(call(COMMANDS_METHOD, Value::Null), &ctx).await.result.unwrap();
        assert_eq!(cmds["commands"].as_array().unwrap().len(), EditorCommand::NAMES.len());
    }
}
