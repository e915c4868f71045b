pub mod datasets_post;

pub use datasets_post::datasets_post;
