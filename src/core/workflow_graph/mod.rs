//! Workflow graph execution for document flows.

pub mod executor;
pub mod form;
pub mod gate;
pub mod gateway;
pub mod graph;
pub mod render;
pub mod schema;
pub mod store;
pub mod transition;

pub use executor::{ActionExecutor, EngineEvent, FlowContext, InvocationState, Operation};
pub use gateway::{HttpPersistenceGateway, PersistenceGateway};
pub use graph::{Edge, Graph, GraphSnapshot, Node, NodeKind};
pub use schema::GraphTemplate;
