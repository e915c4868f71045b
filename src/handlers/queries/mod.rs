pub mod by_ids_get;
pub mod test_post;

pub use by_ids_get::by_ids_get;
pub use test_post::test_post;
