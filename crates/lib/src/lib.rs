//! Report bot core library: the dialogue controller, reference data, external service clients,
//! conversation storage, channels and the gateway used by the CLI.

pub mod channels;
pub mod config;
pub mod dialogue;
pub mod fileshare;
pub mod gateway;
pub mod init;
pub mod llm;
pub mod reference;
pub mod report;
pub mod storage;
