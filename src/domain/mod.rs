pub mod forecast;
pub mod panel;
pub mod types;

pub use forecast::*;
pub use panel::*;
pub use types::*;
