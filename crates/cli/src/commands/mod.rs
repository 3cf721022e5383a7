pub mod logs;
pub mod models;
pub mod onboard;
pub mod run;
pub mod users;
