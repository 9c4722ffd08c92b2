pub mod address;
pub mod mock_session;
pub mod orchestrator;
pub mod partition;
pub mod postgres;
pub mod probe;
pub mod report;
pub mod scanner;
pub mod session;
pub mod sql;
pub mod statistics;
pub mod worker;
