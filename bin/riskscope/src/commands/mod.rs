pub mod analyze;
pub mod config_cmd;
pub mod explore;
pub mod render;
pub mod session_run;
pub mod status;
