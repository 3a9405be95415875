pub mod pool;
pub mod selector;

pub use pool::VariablePool;
pub use selector::{CONVERSATION_NAMESPACE, SYSTEM_NAMESPACE, VariableSelector};
