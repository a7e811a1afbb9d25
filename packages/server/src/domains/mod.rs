// Business domains
pub mod dispatch;
pub mod handymen;
pub mod issues;
pub mod matching;
