//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了协调层的遥测和链路追踪初始化。

use opentelemetry::global;
use opentelemetry::trace::TracerProvider;
use opentelemetry_sdk::trace::TracerProvider as SdkTracerProvider;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

/// 初始化日志和 OpenTelemetry Tracing
///
/// 应在应用程序启动时调用一次，重复调用会被忽略。
/// 过滤规则来自 `RUST_LOG`，未设置时使用 `default_directive`。
///
/// # 参数
///
/// * `service_name` - 作为 tracer 名称
/// * `default_directive` - 默认过滤规则，例如 "info"
pub fn init_tracing(service_name: &str, default_directive: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    // 没有配置 exporter 时 provider 只负责生成 span 上下文
    let provider = SdkTracerProvider::builder().build();
    global::set_tracer_provider(provider.clone());
    let tracer = provider.tracer(service_name.to_string());

    let subscriber = Registry::default()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_span_events(FmtSpan::NONE),
        )
        .with(tracing_opentelemetry::layer().with_tracer(tracer));

    let _ = tracing::subscriber::set_global_default(subscriber);
}
