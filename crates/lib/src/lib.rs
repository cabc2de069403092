//! replybot core library: config, LINE channel, completion client, event dispatcher,
//! and the webhook gateway used by the CLI.

pub mod channels;
pub mod config;
pub mod dispatch;
pub mod gateway;
pub mod init;
pub mod llm;
