pub mod list_get;
pub mod single_delete;
pub mod single_get;
pub mod single_post;
pub mod single_put;
pub mod exposure_query_put;

pub use exposure_query_put::exposure_query_put;
pub use list_get::list_get;
pub use single_delete::single_delete;
pub use single_get::single_get;
pub use single_post::single_post;
pub use single_put::single_put;
