pub mod files; // market CSV lifecycle: metadata header, rotation, archival
pub mod row; // per-tick row assembly from books and trades
pub mod session; // 4h-aligned session directories
