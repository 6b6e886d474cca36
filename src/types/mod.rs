pub mod bar;
pub mod signals;

pub use bar::*;
pub use signals::*;
