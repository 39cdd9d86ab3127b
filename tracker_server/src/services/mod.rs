pub mod activity_service;
pub mod certificate_service;
pub mod import_service;
pub mod password;
pub mod report_service;
pub mod stats_service;
pub mod user_service;
