pub mod cache;
pub mod composer;
pub mod feed;
pub mod recall;
pub mod scoring;

pub use cache::BatchCache;
pub use composer::BatchComposer;
pub use feed::FeedService;
