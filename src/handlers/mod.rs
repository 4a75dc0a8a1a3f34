pub mod feed;

pub use feed::register_routes;
