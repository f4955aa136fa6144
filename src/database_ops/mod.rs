pub mod catalog;
pub mod db;
pub mod ebooks;
