pub mod bitstudio;
pub mod media;
pub mod poller;
pub mod queue;
pub mod storage;
pub mod tasks;
pub mod workflow;
