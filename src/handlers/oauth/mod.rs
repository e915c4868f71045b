pub mod google_redirect_post;

pub use google_redirect_post::google_redirect_post;
