pub mod audio_source;
pub mod music_server;
pub mod recommendations;
