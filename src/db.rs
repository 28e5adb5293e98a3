pub mod bcb;
pub mod prod_db;
