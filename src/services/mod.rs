pub mod cleanup;
pub mod downloader;
pub mod library_matcher;
pub mod matching;
pub mod pipeline;
pub mod reconciler;
pub mod recommendations;
pub mod reindex;
pub mod retry;
pub mod run_lock;
pub mod storage;
pub mod subsonic;
pub mod tagger;
