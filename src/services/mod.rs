pub mod broadcaster;
pub mod browserbase;
pub mod droid;
pub mod extraction;
pub mod openai_client;
pub mod orchestrator;
pub mod run_manager;
pub mod storage;
pub mod target_resolver;

#[cfg(test)]
pub(crate) mod test_support;

pub use broadcaster::*;
pub use browserbase::*;
pub use droid::*;
pub use extraction::*;
pub use openai_client::*;
pub use run_manager::*;
pub use storage::*;
pub use target_resolver::*;
