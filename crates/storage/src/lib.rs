pub mod backend;
pub mod error;
mod key;

pub use crate::backend::{Ack, Capabilities, ContentStore, DirectoryEntry};
pub use crate::key::validate as validate_key;
pub use mcarch_model::StoreKind;
use std::sync::Arc;

pub type StoreHandle = Arc<dyn ContentStore + Send + Sync>;
