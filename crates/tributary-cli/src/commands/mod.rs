pub mod dlq;
pub mod publish;
pub mod run;
pub mod show;
pub mod status;
