mod engine;
mod format;
mod result;
mod token;

pub use engine::*;
pub use format::*;
pub use result::*;
pub use token::*;
