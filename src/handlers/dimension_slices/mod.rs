pub mod cancel_post;
pub mod latest_get;
pub mod single_get;
pub mod start_post;

pub use cancel_post::cancel_post;
pub use latest_get::latest_get;
pub use single_get::single_get;
pub use start_post::start_post;
