pub mod capability;
pub mod record;
pub mod result;
pub mod tool_call;

pub use capability::*;
pub use record::*;
pub use result::*;
pub use tool_call::*;
