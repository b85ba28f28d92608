use tracing_error::ErrorLayer;
use tracing_log::LogTracer;
use tracing_subscriber::{
    filter::Targets,
    fmt::format::FmtSpan,
    layer::SubscriberExt,
    registry::Registry,
    Layer,
};

use crate::config::{LogFormat, Tracing};

pub(crate) fn init_tracing(tracing: &Tracing) -> color_eyre::Result<()> {
    LogTracer::init()?;

    let targets: Targets = tracing.targets.parse()?;

    let format_layer = tracing_subscriber::fmt::layer()
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE);

    match tracing.format {
        LogFormat::Compact => with_format(format_layer.compact(), targets),
        LogFormat::Json => with_format(format_layer.json(), targets),
        LogFormat::Normal => with_format(format_layer, targets),
        LogFormat::Pretty => with_format(format_layer.pretty(), targets),
    }
}

fn with_format<F>(format_layer: F, targets: Targets) -> color_eyre::Result<()>
where
    F: Layer<tracing_subscriber::layer::Layered<ErrorLayer<Registry>, Registry>>
        + Send
        + Sync
        + 'static,
{
    let subscriber = Registry::default()
        .with(ErrorLayer::default())
        .with(format_layer.with_filter(targets));

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}
