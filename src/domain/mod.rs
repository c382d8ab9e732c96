pub mod request;
pub mod run;
pub mod target;

pub use request::*;
pub use run::*;
pub use target::*;
