pub mod auto_create_post;
pub mod discover_post;

pub use auto_create_post::auto_create_post;
pub use discover_post::discover_post;
