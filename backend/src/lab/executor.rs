use futures_util::future::ready;
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use tracing::{debug, info, warn};

use super::registry::LabRegistry;
use super::types::{ExecutionResult, LabArgs, LabError, MessageStream};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionItem {
    Progress(String),
    /// Always the last item of a run.
    Failed(LabError),
}

/// 运行指定模块并把结果统一为消息流。
///
/// 从不向调用方返回错误：加载失败、缺少入口、运行时错误都会变成流里最后一个
/// `Failed`。SSE 响应一旦开始就无法再改状态码，错误只能作为正常帧下发。
pub fn execute_streaming(
    registry: &LabRegistry,
    name: &str,
    args: LabArgs,
) -> BoxStream<'static, ExecutionItem> {
    info!("Executing lab module {} with args {:?}", name, args);

    let result = registry.resolve(name).and_then(|module| module.main(args));
    match result {
        Ok(ExecutionResult::Scalar(value)) => {
            debug!("Lab module {} returned a single value", name);
            stream::once(ready(ExecutionItem::Progress(value))).boxed()
        }
        Ok(ExecutionResult::Stream(messages)) => forward(name.to_string(), messages),
        Err(err) => {
            warn!("Lab module {} could not start: {}", name, err);
            stream::once(ready(ExecutionItem::Failed(err))).boxed()
        }
    }
}

fn forward(name: String, messages: MessageStream) -> BoxStream<'static, ExecutionItem> {
    // State is dropped after the first error so the plugin is never polled again.
    stream::unfold(Some(messages), move |state| {
        let name = name.clone();
        async move {
            let mut messages = state?;
            match messages.next().await {
                Some(Ok(message)) => {
                    debug!("[lab:{}] {}", name, message);
                    Some((ExecutionItem::Progress(message), Some(messages)))
                }
                Some(Err(err)) => {
                    warn!("Error during execution of lab module {}: {}", name, err);
                    Some((ExecutionItem::Failed(err), None))
                }
                None => {
                    info!("Lab module {} finished", name);
                    None
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lab::types::{LabModule, ModuleSpec};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Yields `ok` messages, then fails, counting how many items were pulled.
    struct Flaky {
        ok: usize,
        pulls: Arc<AtomicUsize>,
    }

    impl LabModule for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        fn spec(&self) -> Result<ModuleSpec, LabError> {
            Ok(ModuleSpec {
                module: "flaky".to_string(),
                description: "fails midway".to_string(),
                args: Default::default(),
            })
        }

        fn main(&self, _args: LabArgs) -> Result<ExecutionResult, LabError> {
            let ok = self.ok;
            let pulls = self.pulls.clone();
            let items = (0..ok + 3).map(move |i| {
                if i < ok {
                    Ok(format!("step {i}"))
                } else {
                    Err(LabError::PluginRuntime(format!("exploded at {i}")))
                }
            });
            let counted = stream::iter(items).inspect(move |_| {
                pulls.fetch_add(1, Ordering::SeqCst);
            });
            Ok(ExecutionResult::Stream(counted.boxed()))
        }
    }

    struct NoMain;

    impl LabModule for NoMain {
        fn name(&self) -> &str {
            "no_main"
        }
    }

    fn args(v: serde_json::Value) -> LabArgs {
        v.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn streams_messages_in_order() {
        let registry = LabRegistry::with_builtin_modules();
        let items: Vec<_> =
            execute_streaming(&registry, "foo", args(json!({ "arg1": "a", "arg2": "b" })))
                .collect()
                .await;

        assert_eq!(
            items,
            vec![
                ExecutionItem::Progress("foo: received arguments".to_string()),
                ExecutionItem::Progress("foo: arg1 = a".to_string()),
                ExecutionItem::Progress("foo: arg2 = b".to_string()),
                ExecutionItem::Progress("foo a b".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn scalar_result_yields_once() {
        let registry = LabRegistry::with_builtin_modules();
        let items: Vec<_> = execute_streaming(&registry, "echo", args(json!({ "text": "hi" })))
            .collect()
            .await;
        assert_eq!(items, vec![ExecutionItem::Progress("hi".to_string())]);
    }

    #[tokio::test]
    async fn unknown_module_is_sole_failure() {
        let registry = LabRegistry::with_builtin_modules();
        let items: Vec<_> = execute_streaming(&registry, "missing", LabArgs::new())
            .collect()
            .await;
        assert_eq!(
            items,
            vec![ExecutionItem::Failed(LabError::ModuleNotFound(
                "missing".to_string()
            ))]
        );
    }

    #[tokio::test]
    async fn missing_entry_point_is_sole_failure() {
        let registry = LabRegistry::new();
        registry.register(Arc::new(NoMain));
        let items: Vec<_> = execute_streaming(&registry, "no_main", LabArgs::new())
            .collect()
            .await;
        assert_eq!(
            items,
            vec![ExecutionItem::Failed(LabError::EntryPointUnavailable(
                "no_main".to_string()
            ))]
        );
    }

    #[tokio::test]
    async fn bad_arguments_fail_at_invocation() {
        let registry = LabRegistry::with_builtin_modules();
        let items: Vec<_> = execute_streaming(&registry, "foo", args(json!({ "arg1": "a" })))
            .collect()
            .await;
        assert_eq!(items.len(), 1);
        match &items[0] {
            ExecutionItem::Failed(err @ LabError::PluginRuntime(_)) => {
                let text = err.to_string();
                assert!(text.starts_with("ERROR: "), "{text}");
                assert!(text.contains("arg2"), "{text}");
            }
            other => panic!("unexpected item: {other:?}"),
        }
    }

    #[tokio::test]
    async fn stops_pulling_after_mid_stream_error() {
        for ok in [0usize, 2, 5] {
            let pulls = Arc::new(AtomicUsize::new(0));
            let registry = LabRegistry::new();
            registry.register(Arc::new(Flaky {
                ok,
                pulls: pulls.clone(),
            }));

            let items: Vec<_> = execute_streaming(&registry, "flaky", LabArgs::new())
                .collect()
                .await;

            assert_eq!(items.len(), ok + 1);
            for (i, item) in items.iter().take(ok).enumerate() {
                assert_eq!(item, &ExecutionItem::Progress(format!("step {i}")));
            }
            assert_eq!(
                items[ok],
                ExecutionItem::Failed(LabError::PluginRuntime(format!("exploded at {ok}")))
            );
            assert_eq!(pulls.load(Ordering::SeqCst), ok + 1);
        }
    }

    #[tokio::test]
    async fn each_call_reruns_from_scratch() {
        let registry = LabRegistry::with_builtin_modules();
        let first: Vec<_> = execute_streaming(&registry, "echo", args(json!({ "text": "x" })))
            .collect()
            .await;
        let second: Vec<_> = execute_streaming(&registry, "echo", args(json!({ "text": "x" })))
            .collect()
            .await;
        assert_eq!(first, second);
    }
}
