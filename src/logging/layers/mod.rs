use tracing_subscriber::layer::Layer;

pub mod console;
pub mod file;
pub mod opentelemetry;

/// Boxed layer type so every sink can be stacked onto the same registry.
pub type BoxLayer<S> = Box<dyn Layer<S> + Send + Sync>;
