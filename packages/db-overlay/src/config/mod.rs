pub mod db;
pub mod overlay;
